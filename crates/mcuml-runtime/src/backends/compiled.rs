//! Pre-compiled model backend (interpreter-less shape)
//!
//! Some deployments strip the interpreter entirely: codegen turns the model
//! into object code exposing a small call table. [`CompiledModel`] is that
//! table as a trait. The backend owns no working memory at all — the
//! compiled model carries its own tensors — so the middleware's only jobs
//! are slicing the caller's flat input across the declared input tensors
//! and adapting the table to [`InferenceBackend`].

use std::fmt;

use mcuml_quant::ElemType;

use crate::backend::{EngineKind, InferenceBackend, QuantScheme, TensorInfo};
use crate::error::{MlError, Result};

/// Call table of a model compiled to native code.
pub trait CompiledModel<E: ElemType>: fmt::Debug + Send {
    /// One-time model initialization.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::BadModel`] when the compiled model rejects setup.
    fn init(&mut self) -> Result<()>;

    /// Run one inference over the currently written inputs.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::Inference`] when the model fails.
    fn invoke(&mut self) -> Result<()>;

    /// Number of input tensors.
    fn num_inputs(&self) -> usize;

    /// Element count of input tensor `index`.
    fn input_len(&self, index: usize) -> usize;

    /// Dimensions of input tensor `index`, outermost first.
    fn input_dims(&self, index: usize) -> Vec<usize>;

    /// Quantization of input tensor `index`.
    fn input_quant(&self, index: usize) -> QuantScheme;

    /// Write data into input tensor `index`.
    fn write_input(&mut self, index: usize, data: &[E]);

    /// Output of the most recent invoke.
    fn output(&self) -> &[E];

    /// Quantization of the output tensor.
    fn output_quant(&self) -> QuantScheme;

    /// Clear any internal state.
    fn reset(&mut self);
}

/// Backend adapter over a [`CompiledModel`] call table.
#[derive(Debug)]
pub struct CompiledBackend<E: ElemType> {
    api: Box<dyn CompiledModel<E>>,
    total_input: usize,
    engine_code: i32,
}

impl<E: ElemType> CompiledBackend<E> {
    /// Initialize the compiled model and wrap it.
    ///
    /// # Errors
    ///
    /// Propagates the model's `init` failure.
    pub fn new(mut api: Box<dyn CompiledModel<E>>) -> Result<Self> {
        api.init()?;
        let total_input = (0..api.num_inputs()).map(|i| api.input_len(i)).sum();
        Ok(Self {
            api,
            total_input,
            engine_code: 0,
        })
    }
}

impl<E: ElemType> InferenceBackend<E> for CompiledBackend<E> {
    fn engine(&self) -> EngineKind {
        EngineKind::Compiled
    }

    fn bind_input(&mut self, input: &[E]) -> Result<()> {
        if input.len() != self.total_input {
            return Err(MlError::input_error(format!(
                "input length {} != model input {} (summed over {} tensors)",
                input.len(),
                self.total_input,
                self.api.num_inputs()
            )));
        }
        // Consume the flat slice tensor by tensor, in declaration order.
        let mut offset = 0;
        for i in 0..self.api.num_inputs() {
            let len = self.api.input_len(i);
            self.api.write_input(i, &input[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        match self.api.invoke() {
            Ok(()) => Ok(()),
            Err(e) => {
                if let MlError::Inference { code } = e {
                    self.engine_code = code;
                }
                Err(e)
            }
        }
    }

    fn output(&self) -> &[E] {
        self.api.output()
    }

    fn input_elements(&self) -> usize {
        self.total_input
    }

    fn output_elements(&self) -> usize {
        self.api.output().len()
    }

    fn num_inputs(&self) -> usize {
        self.api.num_inputs()
    }

    fn input_info(&self, index: usize) -> Option<TensorInfo> {
        (index < self.api.num_inputs()).then(|| TensorInfo {
            dims: self.api.input_dims(index),
            elements: self.api.input_len(index),
            elem_bytes: E::BYTES,
            quant: self.api.input_quant(index),
        })
    }

    fn output_info(&self) -> TensorInfo {
        TensorInfo {
            dims: vec![1, self.api.output().len()],
            elements: self.api.output().len(),
            elem_bytes: E::BYTES,
            quant: self.api.output_quant(),
        }
    }

    fn reset_state(&mut self) {
        self.api.reset();
    }

    fn last_engine_code(&self) -> i32 {
        self.engine_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-input compiled model: output is the elementwise sum of both.
    #[derive(Debug)]
    struct SumModel {
        a: Vec<f32>,
        b: Vec<f32>,
        out: Vec<f32>,
        initialized: bool,
    }

    impl SumModel {
        fn new(len: usize) -> Self {
            Self {
                a: vec![0.0; len],
                b: vec![0.0; len],
                out: vec![0.0; len],
                initialized: false,
            }
        }
    }

    impl CompiledModel<f32> for SumModel {
        fn init(&mut self) -> Result<()> {
            self.initialized = true;
            Ok(())
        }

        fn invoke(&mut self) -> Result<()> {
            if !self.initialized {
                return Err(MlError::Inference { code: -9 });
            }
            for ((o, a), b) in self.out.iter_mut().zip(&self.a).zip(&self.b) {
                *o = a + b;
            }
            Ok(())
        }

        fn num_inputs(&self) -> usize {
            2
        }

        fn input_len(&self, _index: usize) -> usize {
            self.a.len()
        }

        fn input_dims(&self, _index: usize) -> Vec<usize> {
            vec![1, self.a.len()]
        }

        fn input_quant(&self, _index: usize) -> QuantScheme {
            QuantScheme::None
        }

        fn write_input(&mut self, index: usize, data: &[f32]) {
            let dst = if index == 0 { &mut self.a } else { &mut self.b };
            dst.copy_from_slice(data);
        }

        fn output(&self) -> &[f32] {
            &self.out
        }

        fn output_quant(&self) -> QuantScheme {
            QuantScheme::None
        }

        fn reset(&mut self) {
            self.a.fill(0.0);
            self.b.fill(0.0);
        }
    }

    #[test]
    fn flat_input_sliced_across_tensors() {
        let mut b = CompiledBackend::new(Box::new(SumModel::new(3))).unwrap();
        assert_eq!(b.input_elements(), 6);
        b.bind_input(&[1.0, 2.0, 3.0, 10.0, 20.0, 30.0]).unwrap();
        b.invoke().unwrap();
        assert_eq!(b.output(), &[11.0, 22.0, 33.0]);
    }

    #[test]
    fn wrong_flat_length_rejected() {
        let mut b = CompiledBackend::new(Box::new(SumModel::new(3))).unwrap();
        let err = b.bind_input(&[1.0; 5]).unwrap_err();
        assert!(matches!(err, MlError::InputError { .. }));
    }

    #[test]
    fn owns_no_working_memory() {
        let b = CompiledBackend::new(Box::new(SumModel::new(3))).unwrap();
        assert_eq!(b.used_buffer_bytes(), 0);
    }
}
