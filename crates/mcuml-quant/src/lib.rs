//! Numeric conversion utilities for MCU ML inference.
//!
//! Firmware images are built for exactly one native element type — `f32`,
//! `i8`, or `i16` — and every tensor crossing the middleware boundary uses
//! it. This crate holds the type axis ([`ElemType`]) and the conversions
//! between application floats and engine storage:
//!
//! | Family   | Forward                      | Inverse                     |
//! |----------|------------------------------|-----------------------------|
//! | Q-format | `stored = round(real * 2^q)` | `real = stored / 2^q`       |
//! | Affine   | `stored = round(real/s) + z` | `real = (stored - z) * s`   |
//!
//! Integer conversions round half away from zero and saturate. Float
//! element types turn every conversion into a copy.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod convert;
mod element;
mod error;

pub use convert::{affine_to_float, find_max, fixed_to_float, float_to_affine, float_to_fixed};
pub use element::ElemType;
pub use error::{QuantError, Result};
