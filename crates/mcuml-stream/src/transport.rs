//! Byte transport abstraction
//!
//! The middleware never drives a UART or USB peripheral itself; the
//! embedding application injects whatever link connects it to the host
//! validation tool. The protocol layer only needs blocking send and a
//! receive with a deadline.

use crate::error::Result;

/// A reliable, ordered byte link to the validation host.
pub trait Transport {
    /// Send all of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StreamError::Comm`] when the link fails.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Fill `buf` completely, waiting at most `timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StreamError::Timeout`] when the deadline passes
    /// and [`crate::StreamError::Comm`] when the link fails.
    fn receive(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<()>;
}
