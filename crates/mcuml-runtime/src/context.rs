//! Process-wide middleware context
//!
//! Everything the original firmware kept in globals lives here instead:
//! the CPU clock frequency, the injected cycle counter, and the optional
//! accelerator context. The application builds one [`MlContext`] at boot
//! and shares it across model objects via `Arc`.

use std::sync::Arc;

use tracing::debug;

use crate::npu::NpuContext;
use crate::profile::{NullTimeSource, TimeSource};

/// Process-wide runtime context.
#[derive(Debug)]
pub struct MlContext {
    cpu_clk_hz: u64,
    time: Box<dyn TimeSource>,
    npu: Option<NpuContext>,
}

impl MlContext {
    /// Build a context for a CPU running at `cpu_clk_hz`.
    ///
    /// The cycle counter defaults to [`NullTimeSource`] (profiling reads
    /// zero until a real counter is injected); no accelerator is attached.
    pub fn new(cpu_clk_hz: u64) -> Self {
        Self {
            cpu_clk_hz,
            time: Box::new(NullTimeSource),
            npu: None,
        }
    }

    /// Inject the platform cycle counter.
    #[must_use]
    pub fn with_time_source(mut self, time: Box<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Attach an accelerator context.
    #[must_use]
    pub fn with_npu(mut self, npu: NpuContext) -> Self {
        debug!(npu_clk_hz = npu.clock_hz(), "accelerator attached");
        self.npu = Some(npu);
        self
    }

    /// Finish construction, ready for sharing across model objects.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// CPU clock frequency in Hz.
    pub fn cpu_clock_hz(&self) -> u64 {
        self.cpu_clk_hz
    }

    /// Current CPU cycle counter reading.
    pub fn cycles_now(&self) -> u64 {
        self.time.cycles()
    }

    /// Attached accelerator, if any.
    pub fn npu(&self) -> Option<&NpuContext> {
        self.npu.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_reads_zero_cycles() {
        let ctx = MlContext::new(150_000_000);
        assert_eq!(ctx.cpu_clock_hz(), 150_000_000);
        assert_eq!(ctx.cycles_now(), 0);
        assert!(ctx.npu().is_none());
    }
}
