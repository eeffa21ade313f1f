//! Cross-backend inference profiling
//!
//! Cycle accounting works the same on every engine: a [`TimeSource`] reads
//! a free-running CPU cycle counter around each invoke, and any cycles the
//! accelerator reports for the same interval are accumulated in their own
//! clock domain, with their CPU-normalized share subtracted from the CPU
//! total. Counters accumulate until the next
//! [`crate::ModelRuntime::profile_config`] call resets them.

use std::fmt;

use tracing::info;

/// Profiling configuration bit set.
///
/// Layer-level and per-frame bits are accepted for forward compatibility
/// but currently add no behavior beyond model-level accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileConfig(u32);

impl ProfileConfig {
    /// No profiling.
    pub const DISABLED: Self = Self(0);
    /// Model-level cycle accounting.
    pub const MODEL: Self = Self(1 << 0);
    /// Layer-level cycle accounting.
    pub const LAYER: Self = Self(1 << 1);
    /// Model-level accounting reported every frame.
    pub const MODEL_PER_FRAME: Self = Self(1 << 2);
    /// Layer-level accounting reported every frame.
    pub const LAYER_PER_FRAME: Self = Self(1 << 3);
    /// Log output values after each invoke.
    pub const OUTPUT_LOG: Self = Self(1 << 4);

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ProfileConfig {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A free-running cycle counter.
///
/// Firmware injects a reader over its DWT/SysTick/PMU counter; tests inject
/// deterministic sources. The default [`NullTimeSource`] always reads zero,
/// which keeps profiling inert when no counter is wired up.
pub trait TimeSource: fmt::Debug + Send + Sync {
    /// Current counter value in CPU cycles.
    fn cycles(&self) -> u64;
}

/// Time source that always reads zero.
#[derive(Debug, Default)]
pub struct NullTimeSource;

impl TimeSource for NullTimeSource {
    fn cycles(&self) -> u64 {
        0
    }
}

/// Accumulated cycle statistics for one clock domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles across all profiled frames.
    pub sum: u64,
    /// Worst single frame.
    pub peak: u64,
    /// Frame index (0-based) of the peak.
    pub peak_frame: u32,
}

impl CycleStats {
    /// Record one frame's cycle count.
    pub fn record(&mut self, cycles: u64, frame: u32) {
        self.sum += cycles;
        if cycles > self.peak {
            self.peak = cycles;
            self.peak_frame = frame;
        }
    }

    /// Average cycles per frame; zero when no frames were profiled.
    pub fn average(&self, frames: u32) -> u64 {
        if frames == 0 {
            0
        } else {
            self.sum / u64::from(frames)
        }
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-model profiling state kept inside the runtime object.
#[derive(Debug, Default)]
pub struct Profiler {
    config: ProfileConfig,
    frames: u32,
    cpu: CycleStats,
    npu: CycleStats,
}

impl Profiler {
    /// Active configuration.
    pub fn config(&self) -> ProfileConfig {
        self.config
    }

    /// Replace the configuration and reset all counters.
    pub fn configure(&mut self, config: ProfileConfig) {
        self.config = config;
        self.frames = 0;
        self.cpu.reset();
        self.npu.reset();
    }

    /// Whether model-level accounting is on.
    pub fn model_enabled(&self) -> bool {
        self.config.contains(ProfileConfig::MODEL)
    }

    /// Whether output logging is on.
    pub fn output_log_enabled(&self) -> bool {
        self.config.contains(ProfileConfig::OUTPUT_LOG)
    }

    /// Record one profiled frame: total elapsed CPU cycles, raw accelerator
    /// cycles, and the accelerator's share normalized to the CPU clock.
    ///
    /// NPU statistics accumulate raw cycles (their clock domain is the
    /// accelerator's); the normalized value only carves the accelerator's
    /// share out of the CPU total.
    pub fn record_frame(&mut self, elapsed: u64, npu_raw: u64, npu_normalized: u64) {
        self.npu.record(npu_raw, self.frames);
        self.cpu.record(elapsed - npu_normalized, self.frames);
        self.frames += 1;
    }

    /// Frames profiled since the last configure.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// CPU-domain statistics.
    pub fn cpu(&self) -> &CycleStats {
        &self.cpu
    }

    /// NPU-domain statistics.
    pub fn npu(&self) -> &CycleStats {
        &self.npu
    }

    /// Emit the accumulated statistics as log events.
    ///
    /// Safe to call with zero profiled frames; averages report as zero.
    pub fn log(&self, model_name: &str, cpu_clk_hz: u64, npu_clk_hz: Option<u64>) {
        info!(
            model = model_name,
            frames = self.frames,
            avg_cycles = self.cpu.average(self.frames),
            peak_cycles = self.cpu.peak,
            peak_frame = self.cpu.peak_frame,
            clk_mhz = cpu_clk_hz / 1_000_000,
            "cpu profile"
        );
        if let Some(npu_clk) = npu_clk_hz {
            info!(
                model = model_name,
                frames = self.frames,
                avg_cycles = self.npu.average(self.frames),
                peak_cycles = self.npu.peak,
                peak_frame = self.npu.peak_frame,
                clk_mhz = npu_clk / 1_000_000,
                "npu profile"
            );
        }
    }
}
