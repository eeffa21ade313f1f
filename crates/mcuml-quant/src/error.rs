//! Error types for numeric conversion

use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, QuantError>;

/// Errors that can occur during quantization and dequantization
#[derive(Debug, Error, PartialEq)]
pub enum QuantError {
    /// Fraction-bit count not representable by the element type
    #[error("Fraction bits {bits} out of range (element type allows at most {max})")]
    FractionBitsOutOfRange {
        /// Requested Q-format fraction bits
        bits: u8,
        /// Maximum the element type supports
        max: u8,
    },

    /// Affine scale must be strictly positive
    #[error("Quantization scale must be positive, got {scale}")]
    NonPositiveScale {
        /// Offending scale value
        scale: f32,
    },

    /// Input and output buffers must have identical element counts
    #[error("Buffer length mismatch: input {input}, output {output}")]
    LengthMismatch {
        /// Input element count
        input: usize,
        /// Output element count
        output: usize,
    },
}
