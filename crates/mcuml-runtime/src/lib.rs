//! Model runtime middleware for MCU ML inference.
//!
//! One stable API over the inference engines a firmware image might link:
//! a proprietary fixed-point engine, a TFLM-style interpreter, or
//! interpreter-less compiled models, with or without an NPU behind them.
//! Applications hold a [`ModelRuntime`] per deployed model and a shared
//! [`MlContext`] carrying the clocking, profiling, and accelerator state.
//!
//! # Lifecycle
//!
//! ```text
//! MlContext::new(clk) ──────────────┐ shared across models
//!                                   ▼
//! ModelRuntime::init(name, binary, buffers, ctx)
//!     │  parses blobs, binds/allocates memory — atomic, rolls back on error
//!     ▼
//! run(&input) → &output        repeated per frame
//!     │                        reset_state() at sequence boundaries
//!     ▼
//! drop                         frees owned buffers only
//! ```
//!
//! # Quick start
//!
//! ```
//! use mcuml_runtime::prelude::*;
//! use mcuml_runtime::backends::pack_fixedpoint_model;
//!
//! # fn main() -> mcuml_runtime::Result<()> {
//! let w_in  = vec![0.25f32; 4 * 4];
//! let w_out = vec![0.5f32; 2 * 4];
//! let (params, weights) = pack_fixedpoint_model(4, 4, 2, 0, 0, &w_in, &[], &w_out);
//!
//! let ctx = MlContext::new(100_000_000).build();
//! let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
//!     "demo",
//!     ModelBinary::FixedPoint { params: &params, weights: &weights },
//!     ModelBuffers::allocate_all(),
//!     ctx,
//! )?;
//! let output = model.run(&[0.1, 0.2, 0.3, 0.4])?;
//! assert_eq!(output.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]

mod arena;
mod backend;
pub mod backends;
mod context;
mod descriptor;
mod error;
mod model;
pub mod npu;
mod profile;

pub use arena::{Arena, Buffer, ARENA_ALIGN};
pub use backend::{EngineKind, InferenceBackend, QuantScheme, TensorInfo};
pub use backends::CompiledModel;
pub use context::MlContext;
pub use descriptor::{validate_name, ModelBinary, ModelBuffers, MODEL_NAME_LEN};
pub use error::{MlError, Result};
pub use model::ModelRuntime;
pub use profile::{CycleStats, NullTimeSource, ProfileConfig, Profiler, TimeSource};

/// Commonly used types.
pub mod prelude {
    pub use crate::npu::{CoherencyPolicy, NpuConfig, NpuContext};
    pub use crate::{
        EngineKind, InferenceBackend, MlContext, MlError, ModelBinary, ModelBuffers,
        ModelRuntime, ProfileConfig, QuantScheme, Result, TensorInfo, TimeSource,
    };
    pub use mcuml_quant::ElemType;
}
