//! Native element type abstraction
//!
//! Inference middleware is built for exactly one element type per firmware
//! image: `f32` for floating-point engines, `i8` or `i16` for fixed-point
//! ones. `ElemType` captures the per-type facts the conversion routines and
//! the runtime need — width, fraction-bit ceiling, saturating float
//! conversion, and little-endian codec for raw frame/arena bytes.

/// A tensor element type usable as the middleware's native data type.
pub trait ElemType:
    Copy + Clone + Default + PartialOrd + Send + Sync + std::fmt::Debug + 'static
{
    /// Size of one element in bytes.
    const BYTES: usize;

    /// Maximum Q-format fraction bits this type can carry.
    ///
    /// Zero for floating-point types, which do not use Q-format.
    const MAX_FRACTION_BITS: u8;

    /// Whether this is a floating-point type (Q-format ops become copies).
    const IS_FLOAT: bool;

    /// Convert from `f32`, rounding half away from zero and saturating to
    /// the type's representable range.
    fn from_f32_saturating(value: f32) -> Self;

    /// Widen to `f32` without loss.
    fn to_f32(self) -> f32;

    /// Decode one element from little-endian bytes.
    ///
    /// The slice must hold at least `Self::BYTES` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode one element as little-endian bytes.
    ///
    /// The slice must hold at least `Self::BYTES` bytes.
    fn write_le(self, bytes: &mut [u8]);
}

impl ElemType for f32 {
    const BYTES: usize = 4;
    const MAX_FRACTION_BITS: u8 = 0;
    const IS_FLOAT: bool = true;

    fn from_f32_saturating(value: f32) -> Self {
        value
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn write_le(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_le_bytes());
    }
}

impl ElemType for i8 {
    const BYTES: usize = 1;
    const MAX_FRACTION_BITS: u8 = 7;
    const IS_FLOAT: bool = false;

    fn from_f32_saturating(value: f32) -> Self {
        let rounded = if value > 0.0 { value + 0.5 } else { value - 0.5 };
        if rounded >= f32::from(i8::MAX) {
            i8::MAX
        } else if rounded <= f32::from(i8::MIN) {
            i8::MIN
        } else {
            // Truncation toward zero after the half-offset implements
            // round-half-away-from-zero.
            rounded as i8
        }
    }

    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }

    fn write_le(self, bytes: &mut [u8]) {
        bytes[0] = self as u8;
    }
}

impl ElemType for i16 {
    const BYTES: usize = 2;
    const MAX_FRACTION_BITS: u8 = 15;
    const IS_FLOAT: bool = false;

    fn from_f32_saturating(value: f32) -> Self {
        let rounded = if value > 0.0 { value + 0.5 } else { value - 0.5 };
        if rounded >= f32::from(i16::MAX) {
            i16::MAX
        } else if rounded <= f32::from(i16::MIN) {
            i16::MIN
        } else {
            rounded as i16
        }
    }

    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write_le(self, bytes: &mut [u8]) {
        bytes[..2].copy_from_slice(&self.to_le_bytes());
    }
}
