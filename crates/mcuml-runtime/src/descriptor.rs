//! Model descriptors: binaries and caller-supplied working memory

use mcuml_quant::ElemType;

use crate::backends::CompiledModel;
use crate::error::{MlError, Result};

/// Maximum model name length, including room for a terminator on the wire.
pub const MODEL_NAME_LEN: usize = 64;

/// The model binary handed to [`crate::ModelRuntime::init`], one variant
/// per engine family.
pub enum ModelBinary<'m, E: ElemType> {
    /// Fixed-point engine: separate parameter and weight blobs.
    FixedPoint {
        /// Parameter blob (topology, sizes, fraction bits).
        params: &'m [u8],
        /// Weight blob.
        weights: &'m [u8],
    },
    /// Interpreter engine: one serialized model blob.
    Interpreter {
        /// Serialized model.
        model: &'m [u8],
    },
    /// Pre-compiled model exposing its call table directly.
    Compiled {
        /// The model's call table.
        api: Box<dyn CompiledModel<E>>,
    },
}

impl<E: ElemType> std::fmt::Debug for ModelBinary<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedPoint { params, weights } => f
                .debug_struct("FixedPoint")
                .field("params_bytes", &params.len())
                .field("weights_bytes", &weights.len())
                .finish(),
            Self::Interpreter { model } => f
                .debug_struct("Interpreter")
                .field("model_bytes", &model.len())
                .finish(),
            Self::Compiled { .. } => f.debug_struct("Compiled").finish_non_exhaustive(),
        }
    }
}

/// Caller-supplied working memory. Any field left `None` is allocated by
/// the middleware and freed when the model object drops; provided regions
/// are borrowed and never freed.
#[derive(Debug, Default)]
pub struct ModelBuffers<'buf> {
    /// Persistent memory (recurrent state) for the fixed-point engine.
    pub persistent: Option<&'buf mut [u8]>,
    /// Scratch memory (activations) for the fixed-point engine.
    pub scratch: Option<&'buf mut [u8]>,
    /// Tensor arena for interpreter engines.
    pub arena: Option<&'buf mut [u8]>,
    /// Override for the arena size declared in the model binary.
    pub arena_size: Option<usize>,
}

impl ModelBuffers<'_> {
    /// Buffers left entirely to the middleware.
    pub fn allocate_all() -> Self {
        Self::default()
    }
}

/// Validate a model name against [`MODEL_NAME_LEN`].
///
/// # Errors
///
/// Returns [`MlError::BadArg`] for empty names or names that do not fit.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MlError::bad_arg("model name must not be empty"));
    }
    if name.len() >= MODEL_NAME_LEN {
        return Err(MlError::bad_arg(format!(
            "model name too long: {} >= {MODEL_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}
