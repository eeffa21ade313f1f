//! Error types for model runtime operations

use mcuml_quant::QuantError;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, MlError>;

/// Errors that can occur during model lifecycle and inference
#[derive(Debug, Error)]
pub enum MlError {
    /// Invalid argument passed to a middleware call
    #[error("Invalid argument: {reason}")]
    BadArg {
        /// What was wrong
        reason: String,
    },

    /// Memory allocation failed
    #[error("Allocation of {what} failed ({bytes} bytes)")]
    AllocFailed {
        /// Buffer that could not be allocated
        what: String,
        /// Requested size in bytes
        bytes: usize,
    },

    /// Model binary is invalid or corrupt
    #[error("Invalid model data: {reason}")]
    BadModel {
        /// What was wrong
        reason: String,
    },

    /// Data type does not match the build's native element type
    #[error("Data type mismatch: {reason}")]
    TypeMismatch {
        /// What was wrong
        reason: String,
    },

    /// Input data invalid for this model
    #[error("Input error: {reason}")]
    InputError {
        /// What was wrong
        reason: String,
    },

    /// Inference engine reported a failure
    #[error("Inference failed (engine code {code})")]
    Inference {
        /// Engine-specific error code, recorded for diagnostics
        code: i32,
    },

    /// Operation timeout
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Accelerator initialization failed
    #[error("NPU initialization failed: {reason}")]
    NpuInit {
        /// What was wrong
        reason: String,
    },

    /// Measured NPU cycles exceed the elapsed interval they occurred in
    #[error("NPU cycle count exceeds measured interval")]
    CycleCount,

    /// Numeric conversion failed
    #[error(transparent)]
    Quant {
        /// Underlying conversion error
        #[from]
        source: QuantError,
    },
}

impl MlError {
    /// Create an invalid argument error
    pub fn bad_arg(reason: impl Into<String>) -> Self {
        Self::BadArg {
            reason: reason.into(),
        }
    }

    /// Create an allocation failure error
    pub fn alloc_failed(what: impl Into<String>, bytes: usize) -> Self {
        Self::AllocFailed {
            what: what.into(),
            bytes,
        }
    }

    /// Create an invalid model error
    pub fn bad_model(reason: impl Into<String>) -> Self {
        Self::BadModel {
            reason: reason.into(),
        }
    }

    /// Create a data type mismatch error
    pub fn type_mismatch(reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            reason: reason.into(),
        }
    }

    /// Create an input error
    pub fn input_error(reason: impl Into<String>) -> Self {
        Self::InputError {
            reason: reason.into(),
        }
    }

    /// Create an NPU initialization error
    pub fn npu_init(reason: impl Into<String>) -> Self {
        Self::NpuInit {
            reason: reason.into(),
        }
    }
}
