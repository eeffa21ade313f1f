//! Engine backends
//!
//! One firmware image links exactly one of these; the runtime object treats
//! them uniformly through [`crate::InferenceBackend`].

pub mod compiled;
pub mod fixedpoint;
pub mod interpreter;

pub use compiled::{CompiledBackend, CompiledModel};
pub use fixedpoint::{pack_fixedpoint_model, FixedPointBackend};
pub use interpreter::{pack_interpreter_model, InterpreterBackend};
