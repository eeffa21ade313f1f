//! Host-driven streaming validation for MCU ML models.
//!
//! A host-side regression tool streams a recorded dataset to the device
//! frame by frame and compares the device's inference output against its
//! golden reference. This crate implements the device side of that
//! exchange over an injected byte [`Transport`]; the embedding application
//! supplies the actual link (UART, USB CDC, a pipe in tests).
//!
//! ```no_run
//! use mcuml_stream::{run_validation, Result, StreamError, StreamOptions, Transport};
//!
//! /// UART link owned by the application.
//! struct Uart;
//!
//! impl Transport for Uart {
//!     fn send(&mut self, _data: &[u8]) -> Result<()> {
//!         Ok(())
//!     }
//!     fn receive(&mut self, _buf: &mut [u8], timeout_ms: u64) -> Result<()> {
//!         Err(StreamError::Timeout { duration_ms: timeout_ms })
//!     }
//! }
//!
//! # fn model() -> mcuml_runtime::ModelRuntime<'static, f32> { todo!() }
//! # fn main() -> mcuml_stream::Result<()> {
//! let mut link = Uart;
//! let mut model = model();
//! run_validation(&mut link, &mut model, &StreamOptions::default())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod error;
mod protocol;
mod session;
mod transport;

pub use error::{Result, StreamError};
pub use protocol::{
    data_type_code, DatasetHeader, RegressionInfo, DATASET_HEADER_BYTES, REGRESSION_INFO_BYTES,
    TOKEN_COMPLETED, TOKEN_DATASET_SEND_REQ, TOKEN_DONE, TOKEN_ERROR, TOKEN_FRAME,
    TOKEN_MODEL_DATA, TOKEN_MODEL_DATA_REQ, TOKEN_READY, TOKEN_RESULT, TOKEN_START,
};
pub use session::{run_validation, StreamOptions};
pub use transport::Transport;
