//! Accelerator binding: driver contract, cache coherency, sync injection
//!
//! One [`NpuContext`] exists per accelerator and lives inside the
//! process-wide [`crate::MlContext`]. It owns the vendor driver, the cache
//! maintenance hooks, the sync primitives, and the cycle accumulator the
//! driver's completion path writes into.

mod cache;
mod driver;
mod sync;

pub use cache::{CacheOps, CoherencyPolicy, CoherencyState, NoCacheOps};
pub use driver::{NpuConfig, NpuDriver};
pub use sync::{BusyWaitSync, NpuSync};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::Result;

/// Runtime state for one accelerator.
///
/// Construction brings the driver up; dropping the context tears it down.
/// Init-once / teardown-once is enforced by ownership: there is exactly one
/// `NpuContext` per accelerator and it cannot be re-initialized.
#[derive(Debug)]
pub struct NpuContext {
    driver: Mutex<Box<dyn NpuDriver>>,
    cache: Box<dyn CacheOps>,
    sync: Box<dyn NpuSync>,
    policy: CoherencyPolicy,
    state: CoherencyState,
    cycles: AtomicU64,
    clock_hz: u64,
}

impl NpuContext {
    /// Bring the accelerator up and build its context.
    ///
    /// Cache maintenance defaults to [`NoCacheOps`], synchronization to
    /// [`BusyWaitSync`], coherency to [`CoherencyPolicy::Always`]; override
    /// with the `with_*` builders before first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MlError::NpuInit`] when the driver fails to enable.
    pub fn init(config: NpuConfig, mut driver: Box<dyn NpuDriver>) -> Result<Self> {
        driver.enable(&config)?;
        let clock_hz = driver.clock_hz();
        debug!(
            base = config.base_address,
            clock_hz, "accelerator enabled"
        );
        Ok(Self {
            driver: Mutex::new(driver),
            cache: Box::new(NoCacheOps),
            sync: Box::new(BusyWaitSync::default()),
            policy: CoherencyPolicy::default(),
            state: CoherencyState::default(),
            cycles: AtomicU64::new(0),
            clock_hz,
        })
    }

    /// Replace the cache maintenance hooks.
    #[must_use]
    pub fn with_cache_ops(mut self, cache: Box<dyn CacheOps>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the sync primitives.
    #[must_use]
    pub fn with_sync(mut self, sync: Box<dyn NpuSync>) -> Self {
        self.sync = sync;
        self
    }

    /// Set the cache coherency policy.
    #[must_use]
    pub fn with_coherency(mut self, policy: CoherencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Accelerator clock frequency in Hz.
    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    /// Active coherency policy.
    pub fn coherency(&self) -> CoherencyPolicy {
        self.policy
    }

    /// Sync primitives, for driver completion paths.
    pub fn sync(&self) -> &dyn NpuSync {
        self.sync.as_ref()
    }

    /// Run a closure with exclusive driver access.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error.
    pub fn with_driver<R>(
        &self,
        f: impl FnOnce(&mut dyn NpuDriver) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self
            .driver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(guard.as_mut())
    }

    /// Add cycles reported by a finished accelerator job.
    ///
    /// Called from the driver completion path; safe in interrupt context.
    pub fn record_cycles(&self, cycles: u64) {
        self.cycles.fetch_add(cycles, Ordering::AcqRel);
    }

    /// Cycles accumulated since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Zero the cycle accumulator.
    pub fn reset_cycles(&self) {
        self.cycles.store(0, Ordering::Release);
    }

    /// Mark the start of an inference window, rearming the conditional
    /// coherency flags.
    pub fn begin_inference(&self) {
        self.state.begin_window();
    }

    /// Clean the data cache over `region` (write back before the
    /// accelerator reads it), subject to the coherency policy.
    pub fn flush_dcache(&self, region: Option<(usize, usize)>) {
        if self.state.should_clean(self.policy) {
            self.cache.clean(region);
        }
    }

    /// Invalidate the data cache over `region` (drop stale lines after the
    /// accelerator wrote it), subject to the coherency policy.
    pub fn invalidate_dcache(&self, region: Option<(usize, usize)>) {
        if self.state.should_invalidate(self.policy) {
            self.cache.invalidate(region);
        }
    }

    /// Normalize accelerator cycles to the CPU clock domain.
    ///
    /// A ratio below one (accelerator slower than the CPU) leaves cycles
    /// unscaled rather than dividing by zero.
    pub fn normalize_cycles(&self, npu_cycles: u64, cpu_clk_hz: u64) -> u64 {
        if cpu_clk_hz == 0 {
            return npu_cycles;
        }
        let ratio = self.clock_hz / cpu_clk_hz;
        if ratio <= 1 {
            npu_cycles
        } else {
            npu_cycles / ratio
        }
    }
}

impl Drop for NpuContext {
    fn drop(&mut self) {
        let mut guard = self
            .driver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = guard.disable() {
            warn!(error = %e, "accelerator teardown failed");
        }
    }
}
