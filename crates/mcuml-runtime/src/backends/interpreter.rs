//! Interpreter engine backend (TFLM-with-interpreter shape)
//!
//! One serialized model blob, one tensor arena. Tensors are carved from the
//! arena at construction; input/output metadata (dims, affine parameters)
//! only becomes known after that carving succeeds, exactly the discovery
//! order an interpreter imposes. The caller may hand in the arena region,
//! override the arena size declared in the blob, or leave both to the
//! middleware.
//!
//! ## Model blob layout
//!
//! | Offset | Field (LE)                       |
//! |--------|----------------------------------|
//! | 0      | declared arena bytes (u32)       |
//! | 4      | input tensor count (u32)         |
//! | 8      | time steps (u32)                 |
//! | 12     | output elements (u32)            |
//! | 16     | operator count (u32)             |
//! | 20     | zero point (i32)                 |
//! | 24     | scale (f32)                      |
//! | 28     | per-input element counts (u32 ×n)|
//! | …      | weights (f32 × out·Σin)          |

use std::ops::Range;

use bytes::Buf;
use mcuml_quant::{affine_to_float, float_to_affine, ElemType};
use tracing::debug;

use crate::arena::{try_vec, Arena, Buffer};
use crate::backend::{EngineKind, InferenceBackend, QuantScheme, TensorInfo};
use crate::descriptor::ModelBuffers;
use crate::error::{MlError, Result};

const MODEL_HEADER_BYTES: usize = 28;
const ENGINE_CODE_NUMERIC: i32 = -2;

/// Interpreter engine backend. See the module docs for the blob layout.
#[derive(Debug)]
pub struct InterpreterBackend<'buf, E: ElemType> {
    arena_buf: Buffer<'buf>,
    input_range: Range<usize>,
    state_range: Range<usize>,
    output_range: Range<usize>,
    used_bytes: usize,
    input_sizes: Vec<usize>,
    total_input: usize,
    output_elems: usize,
    time_steps: usize,
    operators: usize,
    quant: QuantScheme,
    weights: Vec<f32>,
    output: Vec<E>,
    engine_code: i32,
}

impl<'buf, E: ElemType> InterpreterBackend<'buf, E> {
    /// Parse the model blob, size the arena, and carve the tensors.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadModel`] for malformed blobs or when the arena
    /// cannot hold the model's tensors, and [`MlError::AllocFailed`] when
    /// the middleware cannot allocate the arena.
    pub fn new(model: &[u8], buffers: ModelBuffers<'buf>) -> Result<Self> {
        if model.len() < MODEL_HEADER_BYTES {
            return Err(MlError::bad_model(format!(
                "model blob too short: {} < {MODEL_HEADER_BYTES}",
                model.len()
            )));
        }
        let mut m = model;
        let declared_arena = m.get_u32_le() as usize;
        let num_inputs = m.get_u32_le() as usize;
        let time_steps = m.get_u32_le() as usize;
        let output_elems = m.get_u32_le() as usize;
        let operators = m.get_u32_le() as usize;
        let zero_point = m.get_i32_le();
        let scale = m.get_f32_le();

        if num_inputs == 0 || output_elems == 0 {
            return Err(MlError::bad_model("model declares no input or output"));
        }
        if m.remaining() < num_inputs * 4 {
            return Err(MlError::bad_model("truncated input tensor table"));
        }
        let input_sizes: Vec<usize> =
            (0..num_inputs).map(|_| m.get_u32_le() as usize).collect();
        if input_sizes.iter().any(|&s| s == 0) {
            return Err(MlError::bad_model("zero-sized input tensor"));
        }
        let total_input: usize = input_sizes.iter().sum();

        let weight_count = output_elems * total_input;
        if m.remaining() != weight_count * 4 {
            return Err(MlError::bad_model(format!(
                "weight section size mismatch: got {}, expected {}",
                m.remaining(),
                weight_count * 4
            )));
        }
        let weights: Vec<f32> = (0..weight_count).map(|_| m.get_f32_le()).collect();

        let quant = if E::IS_FLOAT {
            QuantScheme::None
        } else {
            if scale <= 0.0 {
                return Err(MlError::bad_model(format!(
                    "non-positive quantization scale {scale}"
                )));
            }
            QuantScheme::Affine { scale, zero_point }
        };

        // Caller override beats the size declared in the blob.
        let arena_capacity = buffers.arena_size.unwrap_or(declared_arena);
        let mut arena_buf = match buffers.arena {
            Some(region) => Buffer::borrowed("tensor arena", region, 0)?,
            None => Buffer::owned("tensor arena", arena_capacity)?,
        };
        let mut plan = Arena::new(arena_buf.len());
        let input_range = plan.carve(total_input * E::BYTES)?;
        // Variable tensor: f32 state carried across invokes on streaming
        // models.
        let state_range = plan.carve(output_elems * 4)?;
        let output_range = plan.carve(output_elems * E::BYTES)?;
        let used_bytes = plan.used();
        arena_buf.clear();

        let output = try_vec("output", output_elems)?;
        debug!(
            num_inputs,
            total_input, output_elems, time_steps, arena_used = used_bytes,
            "interpreter model allocated"
        );
        Ok(Self {
            arena_buf,
            input_range,
            state_range,
            output_range,
            used_bytes,
            input_sizes,
            total_input,
            output_elems,
            time_steps: time_steps.max(1),
            operators,
            quant,
            weights,
            output,
            engine_code: 0,
        })
    }

    fn dims_for(&self, elements: usize) -> Vec<usize> {
        if self.time_steps > 1 && elements % self.time_steps == 0 {
            vec![1, self.time_steps, elements / self.time_steps]
        } else {
            vec![1, elements]
        }
    }
}

impl<E: ElemType> InferenceBackend<E> for InterpreterBackend<'_, E> {
    fn engine(&self) -> EngineKind {
        EngineKind::Interpreter
    }

    fn bind_input(&mut self, input: &[E]) -> Result<()> {
        if input.len() != self.total_input {
            return Err(MlError::input_error(format!(
                "input length {} != model input {} (summed over {} tensors)",
                input.len(),
                self.total_input,
                self.input_sizes.len()
            )));
        }
        // The flat slice fills each input tensor in declaration order.
        let region = &mut self.arena_buf.as_mut_slice()[self.input_range.clone()];
        for (i, v) in input.iter().enumerate() {
            v.write_le(&mut region[i * E::BYTES..]);
        }
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        let region = &self.arena_buf.as_slice()[self.input_range.clone()];
        let stored: Vec<E> = (0..self.total_input)
            .map(|i| E::read_le(&region[i * E::BYTES..]))
            .collect();
        let mut x = vec![0f32; self.total_input];
        match self.quant {
            QuantScheme::Affine { scale, zero_point } => {
                affine_to_float(&stored, &mut x, scale, zero_point)?;
            }
            _ => {
                for (xf, s) in x.iter_mut().zip(&stored) {
                    *xf = s.to_f32();
                }
            }
        }

        // Streaming models feed the variable tensor back into each step.
        let recurrent = self.time_steps > 1;
        let mut y = vec![0f32; self.output_elems];
        {
            let state = &self.arena_buf.as_slice()[self.state_range.clone()];
            for (o, yv) in y.iter_mut().enumerate() {
                let mut acc = 0f32;
                for (i, xv) in x.iter().enumerate() {
                    acc += self.weights[o * self.total_input + i] * xv;
                }
                if recurrent {
                    acc += f32::read_le(&state[o * 4..]);
                }
                *yv = acc;
            }
        }
        if y.iter().any(|v| !v.is_finite()) {
            self.engine_code = ENGINE_CODE_NUMERIC;
            return Err(MlError::Inference {
                code: ENGINE_CODE_NUMERIC,
            });
        }

        // Publish the new variable-tensor state, then the output tensor.
        let state = &mut self.arena_buf.as_mut_slice()[self.state_range.clone()];
        for (i, v) in y.iter().enumerate() {
            v.write_le(&mut state[i * 4..]);
        }
        match self.quant {
            QuantScheme::Affine { scale, zero_point } => {
                float_to_affine(&y, &mut self.output, scale, zero_point)?;
            }
            _ => {
                for (o, v) in self.output.iter_mut().zip(&y) {
                    *o = E::from_f32_saturating(*v);
                }
            }
        }
        let out_region = &mut self.arena_buf.as_mut_slice()[self.output_range.clone()];
        for (i, v) in self.output.iter().enumerate() {
            v.write_le(&mut out_region[i * E::BYTES..]);
        }
        Ok(())
    }

    fn output(&self) -> &[E] {
        &self.output
    }

    fn input_elements(&self) -> usize {
        self.total_input
    }

    fn output_elements(&self) -> usize {
        self.output_elems
    }

    fn num_inputs(&self) -> usize {
        self.input_sizes.len()
    }

    fn input_info(&self, index: usize) -> Option<TensorInfo> {
        let elements = *self.input_sizes.get(index)?;
        Some(TensorInfo {
            dims: self.dims_for(elements),
            elements,
            elem_bytes: E::BYTES,
            quant: self.quant,
        })
    }

    fn output_info(&self) -> TensorInfo {
        TensorInfo {
            dims: vec![1, self.output_elems],
            elements: self.output_elems,
            elem_bytes: E::BYTES,
            quant: self.quant,
        }
    }

    fn reset_state(&mut self) {
        // Interpreter variable-tensor reset.
        self.arena_buf.as_mut_slice()[self.state_range.clone()].fill(0);
    }

    fn recurrent_window(&self) -> Option<usize> {
        (self.time_steps > 1).then_some(self.time_steps)
    }

    fn used_buffer_bytes(&self) -> usize {
        self.used_bytes
    }

    fn layer_count(&self) -> usize {
        self.operators
    }

    fn last_engine_code(&self) -> i32 {
        self.engine_code
    }
}

/// Serialize a model blob for [`InterpreterBackend`].
///
/// `weights` must hold `output_elems × Σ input_sizes` values, row-major by
/// output element.
#[must_use]
pub fn pack_interpreter_model(
    arena_bytes: usize,
    input_sizes: &[usize],
    time_steps: usize,
    output_elems: usize,
    zero_point: i32,
    scale: f32,
    weights: &[f32],
) -> Vec<u8> {
    let mut blob = Vec::with_capacity(MODEL_HEADER_BYTES + input_sizes.len() * 4 + weights.len() * 4);
    blob.extend_from_slice(&(arena_bytes as u32).to_le_bytes());
    blob.extend_from_slice(&(input_sizes.len() as u32).to_le_bytes());
    blob.extend_from_slice(&(time_steps as u32).to_le_bytes());
    blob.extend_from_slice(&(output_elems as u32).to_le_bytes());
    blob.extend_from_slice(&2u32.to_le_bytes());
    blob.extend_from_slice(&zero_point.to_le_bytes());
    blob.extend_from_slice(&scale.to_le_bytes());
    for &s in input_sizes {
        blob.extend_from_slice(&(s as u32).to_le_bytes());
    }
    for &w in weights {
        blob.extend_from_slice(&w.to_le_bytes());
    }
    blob
}
