//! Inference backend abstraction
//!
//! One firmware image links exactly one engine, but the runtime object is
//! engine-agnostic: every engine variant sits behind [`InferenceBackend`].
//! The trait covers what the lifecycle layer needs — input binding, a
//! single invoke step, output access, tensor metadata, recurrent state
//! control, and the engine-specific capabilities (Q-format fraction bits
//! exist only on the fixed-point engine).

use std::fmt;

use mcuml_quant::ElemType;

use crate::error::{MlError, Result};

/// Which engine family a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Proprietary fixed-point engine (Q-format arithmetic).
    FixedPoint,
    /// TFLM-style interpreter over a serialized model and tensor arena.
    Interpreter,
    /// Pre-compiled model exposing a call table, no interpreter.
    Compiled,
}

/// Quantization scheme attached to a tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantScheme {
    /// No quantization (float tensors).
    None,
    /// Q-format fixed point with the given fraction bits.
    QFormat {
        /// Fraction bits `q` in `stored = real * 2^q`.
        fraction_bits: u8,
    },
    /// Affine quantization `real = (stored - zero_point) * scale`.
    Affine {
        /// Scale factor, strictly positive.
        scale: f32,
        /// Zero point offset.
        zero_point: i32,
    },
}

/// Shape and quantization metadata for one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    /// Dimensions, outermost first (batch dimension included).
    pub dims: Vec<usize>,
    /// Total element count.
    pub elements: usize,
    /// Size of one element in bytes.
    pub elem_bytes: usize,
    /// Quantization attached to the tensor.
    pub quant: QuantScheme,
}

/// Contract between the runtime object and an inference engine.
///
/// `E` is the build's native element type; all tensor data crossing this
/// boundary uses it.
pub trait InferenceBackend<E: ElemType>: fmt::Debug + Send {
    /// Engine family of this backend.
    fn engine(&self) -> EngineKind;

    /// Copy one invoke's worth of input into the engine.
    ///
    /// Engines with several input tensors consume the flat slice in
    /// declaration order, each tensor taking its own element count.
    fn bind_input(&mut self, input: &[E]) -> Result<()>;

    /// Run one inference step over the bound input.
    fn invoke(&mut self) -> Result<()>;

    /// Output of the most recent invoke. Location and length are fixed for
    /// the backend's lifetime.
    fn output(&self) -> &[E];

    /// Elements consumed per invoke, summed across input tensors.
    fn input_elements(&self) -> usize;

    /// Elements produced per invoke.
    fn output_elements(&self) -> usize;

    /// Number of input tensors.
    fn num_inputs(&self) -> usize {
        1
    }

    /// Metadata for input tensor `index`.
    fn input_info(&self, index: usize) -> Option<TensorInfo>;

    /// Metadata for the output tensor.
    fn output_info(&self) -> TensorInfo;

    /// Clear recurrent/internal state. No-op for stateless engines.
    fn reset_state(&mut self);

    /// Frames per recurrent window, `None` for non-recurrent models.
    fn recurrent_window(&self) -> Option<usize> {
        None
    }

    /// Working-memory bytes the model actually uses.
    fn used_buffer_bytes(&self) -> usize {
        0
    }

    /// Number of layers / operators, for diagnostics.
    fn layer_count(&self) -> usize {
        0
    }

    /// Engine-specific code from the last failed invoke, 0 if none.
    ///
    /// Recorded for diagnostics only; the middleware never branches on it.
    fn last_engine_code(&self) -> i32 {
        0
    }

    /// Whether the engine exposes Q-format fraction-bit control.
    fn supports_q_format(&self) -> bool {
        false
    }

    /// Current input fraction bits, if the engine uses Q-format.
    fn input_fraction_bits(&self) -> Option<u8> {
        None
    }

    /// Override the input fraction bits for subsequent invokes.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadArg`] on engines without Q-format support.
    fn set_input_fraction_bits(&mut self, _bits: u8) -> Result<()> {
        Err(MlError::bad_arg(
            "engine does not expose Q-format fraction bits",
        ))
    }

    /// Output fraction bits of the most recent invoke, if Q-format.
    fn output_fraction_bits(&self) -> Option<u8> {
        None
    }
}
