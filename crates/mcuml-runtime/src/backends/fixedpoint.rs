//! Fixed-point inference engine backend
//!
//! Wraps the proprietary Q-format engine shape: a parameter blob describing
//! the network, a separate weight blob, persistent memory carrying the
//! recurrent state between invokes, and scratch memory for activations.
//! Arithmetic is a dense (optionally recurrent) reference network — enough
//! to exercise every lifecycle, memory-ownership, and Q-format contract
//! without shipping an operator library.
//!
//! ## Parameter blob layout (all fields u32 LE)
//!
//! | Offset | Field                 |
//! |--------|-----------------------|
//! | 0      | input elements        |
//! | 4      | hidden elements       |
//! | 8      | output elements       |
//! | 12     | recurrent window (0 = feed-forward) |
//! | 16     | layer count           |
//! | 20     | input fraction bits   |
//! | 24     | persistent bytes      |
//! | 28     | scratch bytes         |
//!
//! The weight blob is f32 LE: `w_in [hidden×input]`, then
//! `w_rec [hidden×hidden]` (present only when recurrent), then
//! `w_out [output×hidden]`.

use bytes::Buf;
use mcuml_quant::{fixed_to_float, float_to_fixed, ElemType};
use tracing::debug;

use crate::arena::{try_vec, Buffer};
use crate::backend::{EngineKind, InferenceBackend, QuantScheme, TensorInfo};
use crate::descriptor::ModelBuffers;
use crate::error::{MlError, Result};

const PARAMS_HEADER_BYTES: usize = 32;

/// Engine code recorded when the reference arithmetic produces a
/// non-finite value.
const ENGINE_CODE_NUMERIC: i32 = -2;

/// Fixed-point engine backend. See the module docs for the blob layout.
#[derive(Debug)]
pub struct FixedPointBackend<'buf, E: ElemType> {
    input_elems: usize,
    hidden: usize,
    output_elems: usize,
    window: usize,
    layers: usize,
    input_q: u8,
    output_q: u8,
    w_in: Vec<f32>,
    w_rec: Vec<f32>,
    w_out: Vec<f32>,
    persistent: Buffer<'buf>,
    scratch: Buffer<'buf>,
    input: Vec<E>,
    output: Vec<E>,
    engine_code: i32,
}

impl<'buf, E: ElemType> FixedPointBackend<'buf, E> {
    /// Parse the blobs and bind or allocate working memory.
    ///
    /// Allocation order is persistent, scratch, then output; an error at
    /// any point drops whatever was already allocated, which is the whole
    /// rollback story.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadModel`] for malformed blobs,
    /// [`MlError::BadArg`] for undersized caller buffers, and
    /// [`MlError::AllocFailed`] when middleware allocation fails.
    pub fn new(params: &[u8], weights: &[u8], buffers: ModelBuffers<'buf>) -> Result<Self> {
        if params.len() < PARAMS_HEADER_BYTES {
            return Err(MlError::bad_model(format!(
                "parameter blob too short: {} < {PARAMS_HEADER_BYTES}",
                params.len()
            )));
        }
        let mut p = params;
        let input_elems = p.get_u32_le() as usize;
        let hidden = p.get_u32_le() as usize;
        let output_elems = p.get_u32_le() as usize;
        let window = p.get_u32_le() as usize;
        let layers = p.get_u32_le() as usize;
        let input_q = p.get_u32_le();
        let persistent_bytes = p.get_u32_le() as usize;
        let scratch_bytes = p.get_u32_le() as usize;

        if input_elems == 0 || hidden == 0 || output_elems == 0 {
            return Err(MlError::bad_model("zero-sized tensor in parameter blob"));
        }
        let input_q = u8::try_from(input_q)
            .ok()
            .filter(|&q| E::IS_FLOAT || q <= E::MAX_FRACTION_BITS)
            .ok_or_else(|| {
                MlError::bad_model(format!(
                    "input fraction bits {input_q} invalid for element width"
                ))
            })?;
        // State and preactivations are engine-internal f32.
        let state_bytes = hidden * 4;
        if persistent_bytes < state_bytes || scratch_bytes < state_bytes {
            return Err(MlError::bad_model(format!(
                "declared working memory too small for {hidden} hidden elements"
            )));
        }

        let rec_len = if window > 0 { hidden * hidden } else { 0 };
        let expected_weights = (hidden * input_elems + rec_len + output_elems * hidden) * 4;
        if weights.len() != expected_weights {
            return Err(MlError::bad_model(format!(
                "weight blob size mismatch: got {}, expected {expected_weights}",
                weights.len()
            )));
        }

        let persistent = match buffers.persistent {
            Some(region) => Buffer::borrowed("persistent", region, persistent_bytes)?,
            None => Buffer::owned("persistent", persistent_bytes)?,
        };
        let scratch = match buffers.scratch {
            Some(region) => Buffer::borrowed("scratch", region, scratch_bytes)?,
            None => Buffer::owned("scratch", scratch_bytes)?,
        };
        let input = try_vec("input", input_elems)?;
        let output = try_vec("output", output_elems)?;

        let mut w = weights;
        let read_f32s = |w: &mut &[u8], n: usize| -> Vec<f32> {
            (0..n).map(|_| w.get_f32_le()).collect()
        };
        let w_in = read_f32s(&mut w, hidden * input_elems);
        let w_rec = read_f32s(&mut w, rec_len);
        let w_out = read_f32s(&mut w, output_elems * hidden);

        debug!(
            input_elems,
            hidden, output_elems, window, input_q, "fixed-point model bound"
        );
        Ok(Self {
            input_elems,
            hidden,
            output_elems,
            window,
            layers,
            input_q,
            output_q: input_q,
            w_in,
            w_rec,
            w_out,
            persistent,
            scratch,
            input,
            output,
            engine_code: 0,
        })
    }

    fn state_at(&self, i: usize) -> f32 {
        f32::read_le(&self.persistent.as_slice()[i * 4..])
    }

    fn set_state_at(&mut self, i: usize, v: f32) {
        v.write_le(&mut self.persistent.as_mut_slice()[i * 4..]);
    }

    fn quant(&self) -> QuantScheme {
        if E::IS_FLOAT {
            QuantScheme::None
        } else {
            QuantScheme::QFormat {
                fraction_bits: self.input_q,
            }
        }
    }
}

impl<E: ElemType> InferenceBackend<E> for FixedPointBackend<'_, E> {
    fn engine(&self) -> EngineKind {
        EngineKind::FixedPoint
    }

    fn bind_input(&mut self, input: &[E]) -> Result<()> {
        if input.len() != self.input_elems {
            return Err(MlError::input_error(format!(
                "input length {} != model input {}",
                input.len(),
                self.input_elems
            )));
        }
        self.input.copy_from_slice(input);
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        let q = self.input_q;
        let mut x = vec![0f32; self.input_elems];
        fixed_to_float(&self.input, &mut x, q)?;

        // Preactivations staged through scratch memory.
        for i in 0..self.hidden {
            let mut acc = 0f32;
            for (j, xv) in x.iter().enumerate() {
                acc += self.w_in[i * self.input_elems + j] * xv;
            }
            if self.window > 0 {
                for k in 0..self.hidden {
                    acc += self.w_rec[i * self.hidden + k] * self.state_at(k);
                }
            }
            acc.write_le(&mut self.scratch.as_mut_slice()[i * 4..]);
        }
        for i in 0..self.hidden {
            let act = f32::read_le(&self.scratch.as_slice()[i * 4..]).tanh();
            self.set_state_at(i, act);
        }

        let mut y = vec![0f32; self.output_elems];
        for (o, yv) in y.iter_mut().enumerate() {
            let mut acc = 0f32;
            for i in 0..self.hidden {
                acc += self.w_out[o * self.hidden + i] * self.state_at(i);
            }
            *yv = acc;
        }
        if y.iter().any(|v| !v.is_finite()) {
            self.engine_code = ENGINE_CODE_NUMERIC;
            return Err(MlError::Inference {
                code: ENGINE_CODE_NUMERIC,
            });
        }

        // Output fraction bits follow the input unless the caller overrode
        // them since the last invoke.
        self.output_q = q;
        float_to_fixed(&y, &mut self.output, self.output_q)?;

        if self.window == 0 {
            // Feed-forward models carry no state across invokes.
            self.persistent.clear();
        }
        Ok(())
    }

    fn output(&self) -> &[E] {
        &self.output
    }

    fn input_elements(&self) -> usize {
        self.input_elems
    }

    fn output_elements(&self) -> usize {
        self.output_elems
    }

    fn input_info(&self, index: usize) -> Option<TensorInfo> {
        (index == 0).then(|| TensorInfo {
            dims: vec![1, self.input_elems],
            elements: self.input_elems,
            elem_bytes: E::BYTES,
            quant: self.quant(),
        })
    }

    fn output_info(&self) -> TensorInfo {
        TensorInfo {
            dims: vec![1, self.output_elems],
            elements: self.output_elems,
            elem_bytes: E::BYTES,
            quant: if E::IS_FLOAT {
                QuantScheme::None
            } else {
                QuantScheme::QFormat {
                    fraction_bits: self.output_q,
                }
            },
        }
    }

    fn reset_state(&mut self) {
        self.persistent.clear();
    }

    fn recurrent_window(&self) -> Option<usize> {
        (self.window > 0).then_some(self.window)
    }

    fn used_buffer_bytes(&self) -> usize {
        self.persistent.len() + self.scratch.len()
    }

    fn layer_count(&self) -> usize {
        self.layers
    }

    fn last_engine_code(&self) -> i32 {
        self.engine_code
    }

    fn supports_q_format(&self) -> bool {
        !E::IS_FLOAT
    }

    fn input_fraction_bits(&self) -> Option<u8> {
        (!E::IS_FLOAT).then_some(self.input_q)
    }

    fn set_input_fraction_bits(&mut self, bits: u8) -> Result<()> {
        if E::IS_FLOAT {
            return Err(MlError::bad_arg(
                "floating-point engine has no fraction bits",
            ));
        }
        if bits > E::MAX_FRACTION_BITS {
            return Err(MlError::bad_arg(format!(
                "fraction bits {bits} exceed element maximum {}",
                E::MAX_FRACTION_BITS
            )));
        }
        self.input_q = bits;
        Ok(())
    }

    fn output_fraction_bits(&self) -> Option<u8> {
        (!E::IS_FLOAT).then_some(self.output_q)
    }
}

/// Serialize a parameter/weight blob pair for [`FixedPointBackend`].
///
/// `w_rec` must be empty when `recurrent_window` is zero.
#[must_use]
pub fn pack_fixedpoint_model(
    input_elems: usize,
    hidden: usize,
    output_elems: usize,
    recurrent_window: usize,
    input_fraction_bits: u8,
    w_in: &[f32],
    w_rec: &[f32],
    w_out: &[f32],
) -> (Vec<u8>, Vec<u8>) {
    let state_bytes = hidden * 4;
    let mut params = Vec::with_capacity(PARAMS_HEADER_BYTES);
    for field in [
        input_elems,
        hidden,
        output_elems,
        recurrent_window,
        if recurrent_window > 0 { 3 } else { 2 },
        input_fraction_bits as usize,
        state_bytes,
        state_bytes,
    ] {
        params.extend_from_slice(&(field as u32).to_le_bytes());
    }
    let mut weights = Vec::with_capacity((w_in.len() + w_rec.len() + w_out.len()) * 4);
    for &w in w_in.iter().chain(w_rec).chain(w_out) {
        weights.extend_from_slice(&w.to_le_bytes());
    }
    (params, weights)
}
