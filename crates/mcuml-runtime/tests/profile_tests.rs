//! Profiling and NPU cycle-accounting tests with deterministic sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcuml_runtime::npu::{NpuConfig, NpuContext, NpuDriver, NpuSync};
use mcuml_runtime::prelude::*;
use mcuml_runtime::{ProfileConfig, Result, TensorInfo};

/// Cycle counter that advances a fixed step per read.
#[derive(Debug)]
struct StepTimeSource {
    now: AtomicU64,
    step: u64,
}

impl StepTimeSource {
    fn new(step: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            step,
        }
    }
}

impl TimeSource for StepTimeSource {
    fn cycles(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FakeDriver {
    clock_hz: u64,
}

impl NpuDriver for FakeDriver {
    fn enable(&mut self, _config: &NpuConfig) -> Result<()> {
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        Ok(())
    }

    fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    fn begin_job(&mut self) {}

    fn end_job(&mut self) -> u64 {
        0
    }
}

/// Minimal backend standing in for an accelerator-delegated model: each
/// invoke reports a fixed number of raw NPU cycles into the context.
#[derive(Debug)]
struct DelegatedBackend {
    ctx: Arc<MlContext>,
    job_cycles: u64,
    out: Vec<f32>,
}

impl InferenceBackend<f32> for DelegatedBackend {
    fn engine(&self) -> EngineKind {
        EngineKind::Compiled
    }

    fn bind_input(&mut self, input: &[f32]) -> Result<()> {
        assert_eq!(input.len(), 2);
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        if let Some(npu) = self.ctx.npu() {
            npu.record_cycles(self.job_cycles);
        }
        self.out[0] = 1.0;
        Ok(())
    }

    fn output(&self) -> &[f32] {
        &self.out
    }

    fn input_elements(&self) -> usize {
        2
    }

    fn output_elements(&self) -> usize {
        1
    }

    fn input_info(&self, index: usize) -> Option<TensorInfo> {
        (index == 0).then(|| TensorInfo {
            dims: vec![1, 2],
            elements: 2,
            elem_bytes: 4,
            quant: QuantScheme::None,
        })
    }

    fn output_info(&self) -> TensorInfo {
        TensorInfo {
            dims: vec![1, 1],
            elements: 1,
            elem_bytes: 4,
            quant: QuantScheme::None,
        }
    }

    fn reset_state(&mut self) {}
}

fn npu_ctx(cpu_hz: u64, npu_hz: u64, step: u64, job_cycles: u64) -> (Arc<MlContext>, u64) {
    let npu = NpuContext::init(
        NpuConfig::at(0x4000_0000),
        Box::new(FakeDriver { clock_hz: npu_hz }),
    )
    .unwrap();
    let ctx = MlContext::new(cpu_hz)
        .with_time_source(Box::new(StepTimeSource::new(step)))
        .with_npu(npu)
        .build();
    (ctx, job_cycles)
}

fn delegated_model(
    ctx: Arc<MlContext>,
    job_cycles: u64,
) -> ModelRuntime<'static, f32> {
    let backend = DelegatedBackend {
        ctx: Arc::clone(&ctx),
        job_cycles,
        out: vec![0.0],
    };
    ModelRuntime::from_backend("delegated", Box::new(backend), ctx).unwrap()
}

#[test]
fn npu_cycles_raw_with_normalized_cpu_split() {
    // CPU 100 MHz, NPU 400 MHz: 2000 raw NPU cycles normalize to 500.
    // Each run elapses exactly 1000 CPU cycles (one step between reads).
    // NPU stats stay in the accelerator's clock domain; only the CPU
    // total sheds the normalized share.
    let (ctx, job) = npu_ctx(100_000_000, 400_000_000, 1000, 2000);
    let mut model = delegated_model(ctx, job);
    model.profile_config(ProfileConfig::MODEL);

    model.run(&[0.0, 0.0]).unwrap();
    model.run(&[0.0, 0.0]).unwrap();

    let p = model.profiler();
    assert_eq!(p.frames(), 2);
    assert_eq!(p.npu().sum, 4000); // 2 × 2000 raw
    assert_eq!(p.cpu().sum, 1000); // 2 × (1000 − 500)
    assert_eq!(p.cpu().average(p.frames()), 500);
    assert_eq!(p.npu().peak, 2000);
}

#[test]
fn peak_frame_reported_zero_based() {
    let ctx = MlContext::new(100_000_000)
        .with_time_source(Box::new(StepTimeSource::new(1000)))
        .build();
    let mut model = delegated_model(ctx, 0);
    model.profile_config(ProfileConfig::MODEL);

    // Constant per-frame cost keeps the peak on the first frame.
    model.run(&[0.0, 0.0]).unwrap();
    model.run(&[0.0, 0.0]).unwrap();
    assert_eq!(model.profiler().cpu().peak_frame, 0);
}

#[test]
fn impossible_npu_cycles_error_out() {
    // 8000 raw cycles normalize to 2000, more than the 1000 elapsed.
    let (ctx, job) = npu_ctx(100_000_000, 400_000_000, 1000, 8000);
    let mut model = delegated_model(ctx, job);
    model.profile_config(ProfileConfig::MODEL);

    let err = model.run(&[0.0, 0.0]).unwrap_err();
    assert!(matches!(err, MlError::CycleCount));
    // The bad frame is not recorded.
    assert_eq!(model.profiler().frames(), 0);
}

#[test]
fn cpu_only_profiling_without_npu() {
    let ctx = MlContext::new(100_000_000)
        .with_time_source(Box::new(StepTimeSource::new(700)))
        .build();
    let mut model = delegated_model(ctx, 0);
    model.profile_config(ProfileConfig::MODEL);

    for _ in 0..3 {
        model.run(&[0.0, 0.0]).unwrap();
    }
    let p = model.profiler();
    assert_eq!(p.frames(), 3);
    assert_eq!(p.cpu().sum, 2100);
    assert_eq!(p.npu().sum, 0);
}

#[test]
fn reconfigure_resets_counters_and_accumulator() {
    let (ctx, job) = npu_ctx(100_000_000, 400_000_000, 1000, 2000);
    let mut model = delegated_model(Arc::clone(&ctx), job);
    model.profile_config(ProfileConfig::MODEL);
    model.run(&[0.0, 0.0]).unwrap();
    assert_eq!(model.profiler().frames(), 1);

    model.profile_config(ProfileConfig::MODEL);
    assert_eq!(model.profiler().frames(), 0);
    assert_eq!(model.profiler().cpu().sum, 0);
    assert_eq!(ctx.npu().unwrap().cycles(), 0);
}

/// Sync hooks that count how often the runtime takes the accelerator.
#[derive(Debug, Default)]
struct CountingSync {
    locks: Arc<AtomicU64>,
    unlocks: Arc<AtomicU64>,
}

impl NpuSync for CountingSync {
    fn lock(&self) {
        self.locks.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_done(&self, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    fn signal_done(&self) {}
}

#[test]
fn inference_window_holds_the_accelerator_lock() {
    let locks = Arc::new(AtomicU64::new(0));
    let unlocks = Arc::new(AtomicU64::new(0));
    let npu = NpuContext::init(
        NpuConfig::at(0x4000_0000),
        Box::new(FakeDriver {
            clock_hz: 400_000_000,
        }),
    )
    .unwrap()
    .with_sync(Box::new(CountingSync {
        locks: Arc::clone(&locks),
        unlocks: Arc::clone(&unlocks),
    }));
    let ctx = MlContext::new(100_000_000).with_npu(npu).build();
    let mut model = delegated_model(ctx, 0);

    model.run(&[0.0, 0.0]).unwrap();
    model.run(&[0.0, 0.0]).unwrap();
    assert_eq!(locks.load(Ordering::SeqCst), 2);
    assert_eq!(unlocks.load(Ordering::SeqCst), 2);
}

#[test]
fn profile_log_handles_zero_frames() {
    let (ctx, job) = npu_ctx(100_000_000, 400_000_000, 1000, 0);
    let mut model = delegated_model(ctx, job);
    model.profile_config(ProfileConfig::MODEL);
    // No frames profiled; logging must not divide by zero.
    model.profile_log();
}
