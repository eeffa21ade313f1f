//! Data-cache maintenance for accelerator DMA
//!
//! Accelerators read input tensors and write output tensors over the bus,
//! bypassing the CPU data cache. Before a job the input region must be
//! cleaned (written back); after a job the output region must be
//! invalidated. [`CacheOps`] is the platform hook, [`CoherencyPolicy`]
//! decides when to call it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// When to perform cache maintenance around accelerator jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoherencyPolicy {
    /// Never touch the cache (coherent memory or cache disabled).
    Skip,
    /// Maintain the cache on every request.
    #[default]
    Always,
    /// Maintain at most once per inference window; repeated requests for
    /// the same window collapse into the first.
    Conditional,
}

/// Platform data-cache maintenance operations.
///
/// Regions are passed as address and length so implementations can call
/// by-address CMSIS-style routines; `None` means the whole cache.
pub trait CacheOps: fmt::Debug + Send + Sync {
    /// Write dirty lines covering the region back to memory.
    fn clean(&self, region: Option<(usize, usize)>);

    /// Drop cached lines covering the region so the next read hits memory.
    fn invalidate(&self, region: Option<(usize, usize)>);
}

/// Cache operations for platforms without a data cache.
#[derive(Debug, Default)]
pub struct NoCacheOps;

impl CacheOps for NoCacheOps {
    fn clean(&self, _region: Option<(usize, usize)>) {}

    fn invalidate(&self, _region: Option<(usize, usize)>) {}
}

/// Per-window coherency state for [`CoherencyPolicy::Conditional`].
///
/// Interpreter engines with accelerator-delegated layers may request the
/// same maintenance several times while one inference runs; the flags make
/// the repeats free. A clean leaves the state "cleaned, not invalidated"
/// and an invalidate leaves it "invalidated, not cleaned", so alternating
/// requests always run while back-to-back repeats collapse.
/// [`CoherencyState::begin_window`] rearms both flags at the start of each
/// inference.
#[derive(Debug, Default)]
pub struct CoherencyState {
    cleaned: AtomicBool,
    invalidated: AtomicBool,
}

impl CoherencyState {
    /// Rearm for a new inference window.
    pub fn begin_window(&self) {
        self.cleaned.store(false, Ordering::Release);
        self.invalidated.store(false, Ordering::Release);
    }

    /// Whether a clean should actually run under the given policy.
    pub fn should_clean(&self, policy: CoherencyPolicy) -> bool {
        match policy {
            CoherencyPolicy::Skip => false,
            CoherencyPolicy::Always => true,
            CoherencyPolicy::Conditional => {
                if self.cleaned.swap(true, Ordering::AcqRel) {
                    false
                } else {
                    self.invalidated.store(false, Ordering::Release);
                    true
                }
            }
        }
    }

    /// Whether an invalidate should actually run under the given policy.
    pub fn should_invalidate(&self, policy: CoherencyPolicy) -> bool {
        match policy {
            CoherencyPolicy::Skip => false,
            CoherencyPolicy::Always => true,
            CoherencyPolicy::Conditional => {
                if self.invalidated.swap(true, Ordering::AcqRel) {
                    false
                } else {
                    self.cleaned.store(false, Ordering::Release);
                    true
                }
            }
        }
    }
}
