//! Error types for the streaming validation protocol

use mcuml_runtime::MlError;
use thiserror::Error;

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while streaming validation data
#[derive(Debug, Error)]
pub enum StreamError {
    /// Transport-level communication failure
    #[error("Communication error: {reason}")]
    Comm {
        /// What went wrong
        reason: String,
    },

    /// No data arrived in time
    #[error("Stream timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Peer violated the protocol
    #[error("Protocol violation: {reason}")]
    Protocol {
        /// What went wrong
        reason: String,
    },

    /// Model runtime failure during streaming
    #[error(transparent)]
    Model {
        /// Underlying runtime error
        #[from]
        source: MlError,
    },
}

impl StreamError {
    /// Create a communication error
    pub fn comm(reason: impl Into<String>) -> Self {
        Self::Comm {
            reason: reason.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}
