//! Q-format and affine conversion routines
//!
//! Two quantization families are supported:
//!
//! - **Q-format** (fixed-point): `stored = real * 2^q`, with `q` fraction
//!   bits. Used by the fixed-point inference engine.
//! - **Affine**: `real = (stored - zero_point) * scale`. Used by interpreter
//!   models carrying per-tensor quantization parameters.
//!
//! All integer conversions round half away from zero and saturate to the
//! element type's range. For `f32` element types every routine degenerates
//! to a copy, mirroring a floating-point engine build.

use crate::element::ElemType;
use crate::error::{QuantError, Result};

fn check_lengths(input: usize, output: usize) -> Result<()> {
    if input != output {
        return Err(QuantError::LengthMismatch { input, output });
    }
    Ok(())
}

fn check_fraction_bits<E: ElemType>(bits: u8) -> Result<()> {
    if bits > E::MAX_FRACTION_BITS {
        return Err(QuantError::FractionBitsOutOfRange {
            bits,
            max: E::MAX_FRACTION_BITS,
        });
    }
    Ok(())
}

/// Dequantize Q-format fixed-point values to floats: `out = in / 2^q`.
///
/// # Errors
///
/// Returns [`QuantError::LengthMismatch`] if the buffers differ in length,
/// or [`QuantError::FractionBitsOutOfRange`] if `fraction_bits` exceeds the
/// element type's capacity.
pub fn fixed_to_float<E: ElemType>(
    input: &[E],
    output: &mut [f32],
    fraction_bits: u8,
) -> Result<()> {
    check_lengths(input.len(), output.len())?;
    if E::IS_FLOAT {
        for (o, i) in output.iter_mut().zip(input) {
            *o = i.to_f32();
        }
        return Ok(());
    }
    check_fraction_bits::<E>(fraction_bits)?;
    let scale = (1i64 << fraction_bits) as f32;
    for (o, i) in output.iter_mut().zip(input) {
        *o = i.to_f32() / scale;
    }
    Ok(())
}

/// Quantize floats to Q-format fixed point: `out = round(in * 2^q)`,
/// saturating to the element type's range.
///
/// # Errors
///
/// Returns [`QuantError::LengthMismatch`] if the buffers differ in length,
/// or [`QuantError::FractionBitsOutOfRange`] if `fraction_bits` exceeds the
/// element type's capacity.
pub fn float_to_fixed<E: ElemType>(
    input: &[f32],
    output: &mut [E],
    fraction_bits: u8,
) -> Result<()> {
    check_lengths(input.len(), output.len())?;
    if E::IS_FLOAT {
        for (o, i) in output.iter_mut().zip(input) {
            *o = E::from_f32_saturating(*i);
        }
        return Ok(());
    }
    check_fraction_bits::<E>(fraction_bits)?;
    let scale = (1i64 << fraction_bits) as f32;
    for (o, i) in output.iter_mut().zip(input) {
        *o = E::from_f32_saturating(i * scale);
    }
    Ok(())
}

/// Quantize floats with affine parameters: `out = round(in / scale) + zp`,
/// saturating to the element type's range.
///
/// # Errors
///
/// Returns [`QuantError::NonPositiveScale`] if `scale <= 0`, or
/// [`QuantError::LengthMismatch`] if the buffers differ in length.
pub fn float_to_affine<E: ElemType>(
    input: &[f32],
    output: &mut [E],
    scale: f32,
    zero_point: i32,
) -> Result<()> {
    check_lengths(input.len(), output.len())?;
    if E::IS_FLOAT {
        for (o, i) in output.iter_mut().zip(input) {
            *o = E::from_f32_saturating(*i);
        }
        return Ok(());
    }
    if scale <= 0.0 {
        return Err(QuantError::NonPositiveScale { scale });
    }
    let zp = zero_point as f32;
    for (o, i) in output.iter_mut().zip(input) {
        *o = E::from_f32_saturating(i / scale + zp);
    }
    Ok(())
}

/// Dequantize affine values to floats: `out = (in - zp) * scale`.
///
/// # Errors
///
/// Returns [`QuantError::NonPositiveScale`] if `scale <= 0`, or
/// [`QuantError::LengthMismatch`] if the buffers differ in length.
pub fn affine_to_float<E: ElemType>(
    input: &[E],
    output: &mut [f32],
    scale: f32,
    zero_point: i32,
) -> Result<()> {
    check_lengths(input.len(), output.len())?;
    if E::IS_FLOAT {
        for (o, i) in output.iter_mut().zip(input) {
            *o = i.to_f32();
        }
        return Ok(());
    }
    if scale <= 0.0 {
        return Err(QuantError::NonPositiveScale { scale });
    }
    let zp = zero_point as f32;
    for (o, i) in output.iter_mut().zip(input) {
        *o = (i.to_f32() - zp) * scale;
    }
    Ok(())
}

/// Index of the maximum element, or `None` for an empty slice.
///
/// NaN values in float slices never win the comparison.
pub fn find_max<T: PartialOrd + Copy>(data: &[T]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, v) in data.iter().enumerate() {
        match best {
            None => best = Some(idx),
            Some(b) => {
                if *v > data[b] {
                    best = Some(idx);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q7_quantize_half() {
        let mut out = [0i8; 1];
        float_to_fixed(&[0.5], &mut out, 7).unwrap();
        assert_eq!(out[0], 64);
    }

    #[test]
    fn q7_quantize_saturates() {
        let mut out = [0i8; 2];
        float_to_fixed(&[2.0, -2.0], &mut out, 7).unwrap();
        assert_eq!(out, [127, -128]);
    }

    #[test]
    fn q_roundtrip_within_one_step() {
        let input = [0.37f32, -0.81, 0.02, 0.99];
        let mut q = [0i8; 4];
        let mut back = [0f32; 4];
        float_to_fixed(&input, &mut q, 7).unwrap();
        fixed_to_float(&q, &mut back, 7).unwrap();
        let step = 1.0 / 128.0;
        for (a, b) in input.iter().zip(back.iter()) {
            assert!((a - b).abs() <= step, "{a} vs {b}");
        }
    }

    #[test]
    fn q15_roundtrip() {
        let input = [0.12345f32, -0.5];
        let mut q = [0i16; 2];
        let mut back = [0f32; 2];
        float_to_fixed(&input, &mut q, 15).unwrap();
        fixed_to_float(&q, &mut back, 15).unwrap();
        let step = 1.0 / 32768.0;
        for (a, b) in input.iter().zip(back.iter()) {
            assert!((a - b).abs() <= step);
        }
    }

    #[test]
    fn fraction_bits_validated() {
        let mut out = [0i8; 1];
        let err = float_to_fixed(&[0.5], &mut out, 8).unwrap_err();
        assert_eq!(
            err,
            QuantError::FractionBitsOutOfRange { bits: 8, max: 7 }
        );
    }

    #[test]
    fn affine_quantize() {
        let mut out = [0i8; 1];
        float_to_affine(&[1.0], &mut out, 0.1, 10).unwrap();
        assert_eq!(out[0], 20);
    }

    #[test]
    fn affine_dequantize() {
        let mut out = [0f32; 1];
        affine_to_float(&[20i8], &mut out, 0.1, 10).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn affine_rejects_zero_scale() {
        let mut out = [0i8; 1];
        let err = float_to_affine(&[1.0], &mut out, 0.0, 0).unwrap_err();
        assert_eq!(err, QuantError::NonPositiveScale { scale: 0.0 });
    }

    #[test]
    fn float_build_is_identity() {
        let input = [1.25f32, -3.5];
        let mut q = [0f32; 2];
        let mut back = [0f32; 2];
        float_to_fixed(&input, &mut q, 0).unwrap();
        assert_eq!(q, input);
        fixed_to_float(&q, &mut back, 0).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut out = [0i8; 2];
        let err = float_to_fixed(&[0.5], &mut out, 7).unwrap_err();
        assert_eq!(err, QuantError::LengthMismatch { input: 1, output: 2 });
    }

    #[test]
    fn find_max_basics() {
        assert_eq!(find_max::<i32>(&[]), None);
        assert_eq!(find_max(&[3i32, 9, 1]), Some(1));
        assert_eq!(find_max(&[-5i8, -2, -7]), Some(1));
        assert_eq!(find_max(&[0.1f32, 0.9, 0.4]), Some(1));
    }

    #[test]
    fn find_max_first_wins_on_tie() {
        assert_eq!(find_max(&[7i32, 7, 3]), Some(0));
    }
}
