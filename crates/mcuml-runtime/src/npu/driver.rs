//! Vendor NPU driver contract

use std::fmt;

use crate::error::Result;

/// Static configuration for bringing up an accelerator.
#[derive(Debug, Clone)]
pub struct NpuConfig {
    /// Peripheral base address.
    pub base_address: usize,
    /// Interrupt priority for the completion IRQ.
    pub irq_priority: u8,
    /// Whether the NPU runs in the secure domain.
    pub secure: bool,
    /// Whether NPU bus accesses are privileged.
    pub privileged: bool,
}

impl Default for NpuConfig {
    fn default() -> Self {
        Self {
            base_address: 0,
            irq_priority: 3,
            secure: true,
            privileged: true,
        }
    }
}

impl NpuConfig {
    /// Configuration for a peripheral at `base_address` with defaults.
    pub fn at(base_address: usize) -> Self {
        Self {
            base_address,
            ..Self::default()
        }
    }
}

/// The operations a vendor accelerator driver must provide.
///
/// The middleware brings the driver up once per process via
/// [`crate::npu::NpuContext::init`] and tears it down when the context
/// drops. Cycle counts flow back through
/// [`crate::npu::NpuContext::record_cycles`] from the driver's completion
/// path.
pub trait NpuDriver: fmt::Debug + Send {
    /// Power up the peripheral, wire the completion interrupt, and make the
    /// accelerator ready for jobs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MlError::NpuInit`] when bring-up fails.
    fn enable(&mut self, config: &NpuConfig) -> Result<()>;

    /// Disable the completion interrupt and power the peripheral down.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MlError::NpuInit`] when teardown fails.
    fn disable(&mut self) -> Result<()>;

    /// Accelerator clock frequency in Hz, valid after `enable`.
    fn clock_hz(&self) -> u64;

    /// Arm the cycle counter before a job is submitted.
    ///
    /// Called by the vendor port's job submission path, not by the
    /// middleware; the middleware only consumes the totals the port
    /// reports via [`crate::npu::NpuContext::record_cycles`].
    fn begin_job(&mut self);

    /// Read cycles consumed by the finished job. Counter overflow reads
    /// as zero.
    ///
    /// Called by the vendor port's completion path.
    fn end_job(&mut self) -> u64;
}
