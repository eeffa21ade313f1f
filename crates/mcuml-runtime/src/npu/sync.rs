//! Synchronization primitives injected around accelerator jobs
//!
//! The middleware runs bare-metal or under an RTOS; it never links a
//! scheduler itself. [`NpuSync`] is the seam: an RTOS port backs it with a
//! real mutex and semaphore, the bare-metal default busy-waits on a flag
//! set from the completion interrupt.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{MlError, Result};

/// Mutual exclusion plus job-completion signalling for one accelerator.
///
/// The runtime holds the lock across each inference's hardware window;
/// the wait/signal pair belongs to vendor driver ports, whose submission
/// path waits and whose completion interrupt signals.
pub trait NpuSync: fmt::Debug + Send + Sync {
    /// Take the accelerator for exclusive use.
    fn lock(&self);

    /// Release the accelerator.
    fn unlock(&self);

    /// Block until the current job signals completion.
    ///
    /// # Errors
    ///
    /// Returns [`MlError::Timeout`] when no completion arrives in time.
    fn wait_done(&self, timeout_ms: u64) -> Result<()>;

    /// Signal job completion. Called from the driver's completion path,
    /// interrupt context included.
    fn signal_done(&self);
}

/// Bare-metal default: spin on a completion flag.
///
/// `signal_done` is safe to call from an interrupt handler; it only stores
/// an atomic flag.
#[derive(Debug, Default)]
pub struct BusyWaitSync {
    done: AtomicBool,
}

impl NpuSync for BusyWaitSync {
    fn lock(&self) {}

    fn unlock(&self) {}

    fn wait_done(&self, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while !self.done.swap(false, Ordering::AcqRel) {
            if Instant::now() >= deadline {
                return Err(MlError::Timeout {
                    duration_ms: timeout_ms,
                });
            }
            std::hint::spin_loop();
        }
        Ok(())
    }

    fn signal_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}
