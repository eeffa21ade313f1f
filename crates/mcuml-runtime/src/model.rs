//! Model runtime object: lifecycle, inference, introspection
//!
//! [`ModelRuntime`] is the one object applications hold per deployed model.
//! Construction parses the model binary, binds or allocates working memory,
//! and brings the engine up — atomically: any failure drops exactly the
//! middleware-side allocations made so far and never touches caller memory.
//! Dropping the object is deinit; owned buffers are freed once, borrowed
//! buffers are left alone, and the type system makes the double-free and
//! wrong-free cases unrepresentable.

use std::sync::Arc;

use mcuml_quant::{fixed_to_float, float_to_fixed, ElemType};
use tracing::{debug, info};

use crate::backend::{EngineKind, InferenceBackend, QuantScheme, TensorInfo};
use crate::backends::{CompiledBackend, FixedPointBackend, InterpreterBackend};
use crate::context::MlContext;
use crate::descriptor::{validate_name, ModelBinary, ModelBuffers};
use crate::error::{MlError, Result};
use crate::profile::{ProfileConfig, Profiler};

fn region_of<T>(slice: &[T]) -> (usize, usize) {
    (slice.as_ptr() as usize, std::mem::size_of_val(slice))
}

/// A deployed model: engine, working memory, and profiling state.
///
/// `'buf` is the lifetime of any caller-provided working memory; `E` is the
/// build's native element type.
#[derive(Debug)]
pub struct ModelRuntime<'buf, E: ElemType> {
    name: String,
    ctx: Arc<MlContext>,
    backend: Box<dyn InferenceBackend<E> + 'buf>,
    input_len: usize,
    output_len: usize,
    model_bytes: usize,
    profiler: Profiler,
}

impl<'buf, E: ElemType> ModelRuntime<'buf, E> {
    /// Initialize a model from its binary and working-memory descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadArg`] for an invalid name or undersized caller
    /// buffers, [`MlError::BadModel`] for malformed binaries, and
    /// [`MlError::AllocFailed`] when working memory cannot be allocated.
    /// On any error nothing is leaked and caller memory is untouched.
    pub fn init(
        name: &str,
        binary: ModelBinary<'_, E>,
        buffers: ModelBuffers<'buf>,
        ctx: Arc<MlContext>,
    ) -> Result<Self> {
        validate_name(name)?;
        let model_bytes = match &binary {
            ModelBinary::FixedPoint { params, weights } => params.len() + weights.len(),
            ModelBinary::Interpreter { model } => model.len(),
            ModelBinary::Compiled { .. } => 0,
        };
        let backend: Box<dyn InferenceBackend<E> + 'buf> = match binary {
            ModelBinary::FixedPoint { params, weights } => {
                Box::new(FixedPointBackend::new(params, weights, buffers)?)
            }
            ModelBinary::Interpreter { model } => {
                Box::new(InterpreterBackend::new(model, buffers)?)
            }
            ModelBinary::Compiled { api } => Box::new(CompiledBackend::new(api)?),
        };
        Ok(Self::from_backend_inner(name, backend, model_bytes, ctx))
    }

    /// Wrap an already-built backend (custom engines, tests).
    pub fn from_backend(
        name: &str,
        backend: Box<dyn InferenceBackend<E> + 'buf>,
        ctx: Arc<MlContext>,
    ) -> Result<Self> {
        validate_name(name)?;
        Ok(Self::from_backend_inner(name, backend, 0, ctx))
    }

    fn from_backend_inner(
        name: &str,
        backend: Box<dyn InferenceBackend<E> + 'buf>,
        model_bytes: usize,
        ctx: Arc<MlContext>,
    ) -> Self {
        let input_len = backend.input_elements();
        let output_len = backend.output_elements();
        debug!(
            model = name,
            engine = ?backend.engine(),
            input_len,
            output_len,
            "model initialized"
        );
        Self {
            name: name.to_owned(),
            ctx,
            backend,
            input_len,
            output_len,
            model_bytes,
            profiler: Profiler::default(),
        }
    }

    /// Run one inference step and return the output.
    ///
    /// Recurrent state is never reset here; the caller decides sequence
    /// boundaries via [`Self::reset_state`]. On failure the object stays
    /// valid and the engine's code is kept for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::InputError`] for a wrong-sized input,
    /// [`MlError::Inference`] when the engine fails, and
    /// [`MlError::CycleCount`] when profiling measures more normalized NPU
    /// cycles than elapsed time.
    pub fn run(&mut self, input: &[E]) -> Result<&[E]> {
        if input.len() != self.input_len {
            return Err(MlError::input_error(format!(
                "input length {} != model input {}",
                input.len(),
                self.input_len
            )));
        }
        self.backend.bind_input(input)?;

        let npu = self.ctx.npu();
        if let Some(npu) = npu {
            npu.begin_inference();
        }

        let profiling = self.profiler.model_enabled();
        let start = if profiling {
            if let Some(npu) = npu {
                npu.reset_cycles();
            }
            self.ctx.cycles_now()
        } else {
            0
        };

        if let Some(npu) = npu {
            npu.sync().lock();
            npu.flush_dcache(Some(region_of(input)));
        }
        let invoked = self.backend.invoke();
        if let Some(npu) = npu {
            npu.invalidate_dcache(Some(region_of(self.backend.output())));
            npu.sync().unlock();
        }
        if let Err(e) = invoked {
            debug!(
                model = %self.name,
                engine_code = self.backend.last_engine_code(),
                "inference failed"
            );
            return Err(e);
        }

        if profiling {
            let elapsed = self.ctx.cycles_now().saturating_sub(start);
            let raw = npu.map_or(0, crate::npu::NpuContext::cycles);
            let normalized =
                npu.map_or(0, |n| n.normalize_cycles(raw, self.ctx.cpu_clock_hz()));
            if normalized > elapsed {
                return Err(MlError::CycleCount);
            }
            self.profiler.record_frame(elapsed, raw, normalized);
        } else if self.profiler.output_log_enabled() {
            let rendered: Vec<String> = self
                .backend
                .output()
                .iter()
                .map(|v| format!("{:6.3}", v.to_f32()))
                .collect();
            info!(model = %self.name, output = %rendered.join(" "), "inference output");
        }
        Ok(self.backend.output())
    }

    /// Output of the most recent inference. Same location and length for
    /// the object's whole lifetime.
    pub fn output(&self) -> &[E] {
        self.backend.output()
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine family backing this model.
    pub fn engine(&self) -> EngineKind {
        self.backend.engine()
    }

    /// Elements consumed per inference.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Elements produced per inference.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Size of the model binary in bytes.
    pub fn model_size(&self) -> usize {
        self.model_bytes
    }

    /// Working-memory bytes the model actually uses.
    pub fn buffer_size(&self) -> usize {
        self.backend.used_buffer_bytes()
    }

    /// Number of input tensors.
    pub fn num_inputs(&self) -> usize {
        self.backend.num_inputs()
    }

    /// Metadata for input tensor `index`.
    pub fn input_info(&self, index: usize) -> Option<TensorInfo> {
        self.backend.input_info(index)
    }

    /// Metadata for the output tensor.
    pub fn output_info(&self) -> TensorInfo {
        self.backend.output_info()
    }

    /// Clear recurrent state. Call between independent sequences.
    pub fn reset_state(&mut self) {
        self.backend.reset_state();
    }

    /// Frames per recurrent window, `None` for non-recurrent models.
    pub fn recurrent_window(&self) -> Option<usize> {
        self.backend.recurrent_window()
    }

    /// Current input fraction bits, if the engine uses Q-format.
    pub fn input_fraction_bits(&self) -> Option<u8> {
        self.backend.input_fraction_bits()
    }

    /// Override the input fraction bits for subsequent inferences.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadArg`] when the engine has no Q-format support
    /// or the bits exceed the element type's range.
    pub fn set_input_fraction_bits(&mut self, bits: u8) -> Result<()> {
        self.backend.set_input_fraction_bits(bits)
    }

    /// Output fraction bits of the most recent inference; zero on engines
    /// without Q-format.
    pub fn output_fraction_bits(&self) -> u8 {
        self.backend.output_fraction_bits().unwrap_or(0)
    }

    /// Quantize application floats into the model's input representation.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::Quant`] on length mismatch or bad parameters.
    pub fn quantize_input(&self, values: &[f32], out: &mut [E]) -> Result<()> {
        let quant = self
            .backend
            .input_info(0)
            .map_or(QuantScheme::None, |t| t.quant);
        apply_quantize(quant, values, out)
    }

    /// Dequantize the most recent output into application floats.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::Quant`] on length mismatch or bad parameters.
    pub fn dequantize_output(&self, out: &mut [f32]) -> Result<()> {
        apply_dequantize(self.backend.output_info().quant, self.backend.output(), out)
    }

    /// Log the model's vital statistics.
    pub fn log_model_info(&self) {
        info!(
            model = %self.name,
            engine = ?self.backend.engine(),
            model_bytes = self.model_bytes,
            buffer_bytes = self.backend.used_buffer_bytes(),
            input_len = self.input_len,
            output_len = self.output_len,
            layers = self.backend.layer_count(),
            recurrent_window = self.backend.recurrent_window().unwrap_or(0),
            "model info"
        );
    }

    /// Replace the profiling configuration, resetting all counters.
    ///
    /// The accelerator's cycle accumulator is reset regardless of the new
    /// configuration.
    pub fn profile_config(&mut self, config: ProfileConfig) {
        self.profiler.configure(config);
        if let Some(npu) = self.ctx.npu() {
            npu.reset_cycles();
        }
    }

    /// Emit accumulated profiling statistics as log events.
    pub fn profile_log(&self) {
        self.profiler.log(
            &self.name,
            self.ctx.cpu_clock_hz(),
            self.ctx.npu().map(crate::npu::NpuContext::clock_hz),
        );
    }

    /// Profiling state, for callers that post-process the counters.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// The underlying engine backend.
    pub fn backend(&self) -> &dyn InferenceBackend<E> {
        self.backend.as_ref()
    }

    /// Mutable access to the underlying engine backend.
    pub fn backend_mut(&mut self) -> &mut (dyn InferenceBackend<E> + 'buf) {
        self.backend.as_mut()
    }
}

fn apply_quantize<E: ElemType>(quant: QuantScheme, values: &[f32], out: &mut [E]) -> Result<()> {
    match quant {
        QuantScheme::None => float_to_fixed(values, out, 0)?,
        QuantScheme::QFormat { fraction_bits } => float_to_fixed(values, out, fraction_bits)?,
        QuantScheme::Affine { scale, zero_point } => {
            mcuml_quant::float_to_affine(values, out, scale, zero_point)?;
        }
    }
    Ok(())
}

fn apply_dequantize<E: ElemType>(quant: QuantScheme, stored: &[E], out: &mut [f32]) -> Result<()> {
    match quant {
        QuantScheme::None => fixed_to_float(stored, out, 0)?,
        QuantScheme::QFormat { fraction_bits } => fixed_to_float(stored, out, fraction_bits)?,
        QuantScheme::Affine { scale, zero_point } => {
            mcuml_quant::affine_to_float(stored, out, scale, zero_point)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::pack_fixedpoint_model;

    fn ctx() -> Arc<MlContext> {
        MlContext::new(100_000_000).build()
    }

    fn small_model() -> (Vec<u8>, Vec<u8>) {
        let w_in = vec![0.25f32; 4 * 4];
        let w_out = vec![0.5f32; 2 * 4];
        pack_fixedpoint_model(4, 4, 2, 0, 0, &w_in, &[], &w_out)
    }

    #[test]
    fn init_run_deinit() {
        let (params, weights) = small_model();
        let mut m: ModelRuntime<'_, f32> = ModelRuntime::init(
            "fwd_4_2",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            ModelBuffers::allocate_all(),
            ctx(),
        )
        .unwrap();
        assert_eq!(m.input_len(), 4);
        assert_eq!(m.output_len(), 2);
        let out = m.run(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn init_rejects_bad_name() {
        let (params, weights) = small_model();
        let err = ModelRuntime::<f32>::init(
            "",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            ModelBuffers::allocate_all(),
            ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, MlError::BadArg { .. }));
    }

    #[test]
    fn run_rejects_wrong_input_length() {
        let (params, weights) = small_model();
        let mut m: ModelRuntime<'_, f32> = ModelRuntime::init(
            "fwd_4_2",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            ModelBuffers::allocate_all(),
            ctx(),
        )
        .unwrap();
        let err = m.run(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, MlError::InputError { .. }));
    }

    #[test]
    fn output_location_is_stable() {
        let (params, weights) = small_model();
        let mut m: ModelRuntime<'_, f32> = ModelRuntime::init(
            "fwd_4_2",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            ModelBuffers::allocate_all(),
            ctx(),
        )
        .unwrap();
        let p1 = m.run(&[0.0; 4]).unwrap().as_ptr();
        let p2 = m.run(&[1.0; 4]).unwrap().as_ptr();
        assert_eq!(p1, p2);
    }

    #[test]
    fn quantize_dequantize_against_model_params() {
        let w_in = vec![0.25f32; 4];
        let w_out = vec![1.0f32; 2];
        let (params, weights) = pack_fixedpoint_model(2, 2, 1, 0, 7, &w_in, &[], &w_out);
        let m: ModelRuntime<'_, i8> = ModelRuntime::init(
            "q7_model",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            ModelBuffers::allocate_all(),
            ctx(),
        )
        .unwrap();
        let mut q = [0i8; 2];
        m.quantize_input(&[0.5, -0.5], &mut q).unwrap();
        assert_eq!(q, [64, -64]);
    }
}
