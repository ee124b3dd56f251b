//! GPU Memory Oracle.
//!
//! Reports live GPU memory state on every call — unlike the teacher's
//! `engine::gpu::GpuManager`, which tracks *allocations it made itself*
//! against a cached device total, this oracle polls actual host GPU state so
//! the admission planner always sees what's really free, including memory
//! used by backends that crashed without releasing it cleanly.

mod estimate;

pub use estimate::estimate_memory_mb;

use crate::config::GpuSettings;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("GPU device {device_id} not found")]
    DeviceNotFound { device_id: u32 },
    #[error("NVML probe failed: {0}")]
    Probe(String),
}

/// A single live read of GPU memory state, in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSnapshot {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
}

impl GpuSnapshot {
    /// Free memory after subtracting the operator-configured safety buffer.
    /// `usable capacity = total - reserved`; free headroom is that minus
    /// whatever's currently in use, floored at zero.
    pub fn usable_mb(&self, settings: &GpuSettings) -> u64 {
        let usable_capacity = self.total_mb.saturating_sub(settings.reserved_buffer_mb);
        usable_capacity.saturating_sub(self.used_mb)
    }
}

/// Anything that can report current GPU memory state.
pub trait GpuOracle: Send + Sync {
    fn snapshot(&self) -> Result<GpuSnapshot, GpuError>;
}

/// Always reports zero capacity. Used when compiled without the `nvml`
/// feature, or when the real probe fails at startup — mirrors the teacher's
/// CPU fallback in `GpuManager::select_device`: degrade, don't panic.
pub struct NoGpuOracle;

impl GpuOracle for NoGpuOracle {
    fn snapshot(&self) -> Result<GpuSnapshot, GpuError> {
        Ok(GpuSnapshot {
            total_mb: 0,
            used_mb: 0,
            free_mb: 0,
        })
    }
}

#[cfg(feature = "nvml")]
pub struct NvmlOracle {
    device: nvml_wrapper::Device<'static>,
    // Leaked once at construction; the oracle lives for the process lifetime.
    _nvml: &'static nvml_wrapper::Nvml,
}

#[cfg(feature = "nvml")]
impl NvmlOracle {
    pub fn new(device_id: u32) -> Result<Self, GpuError> {
        let nvml = nvml_wrapper::Nvml::init().map_err(|e| GpuError::Probe(e.to_string()))?;
        let nvml: &'static nvml_wrapper::Nvml = Box::leak(Box::new(nvml));
        let device = nvml
            .device_by_index(device_id)
            .map_err(|_| GpuError::DeviceNotFound { device_id })?;
        Ok(Self {
            device,
            _nvml: nvml,
        })
    }
}

#[cfg(feature = "nvml")]
impl GpuOracle for NvmlOracle {
    fn snapshot(&self) -> Result<GpuSnapshot, GpuError> {
        let info = self
            .device
            .memory_info()
            .map_err(|e| GpuError::Probe(e.to_string()))?;
        const MIB: u64 = 1024 * 1024;
        Ok(GpuSnapshot {
            total_mb: info.total / MIB,
            used_mb: info.used / MIB,
            free_mb: info.free / MIB,
        })
    }
}

/// Build the oracle configured by `settings`, falling back to `NoGpuOracle`
/// when NVML isn't compiled in or the probe fails at startup.
pub fn build_oracle(settings: &GpuSettings) -> Box<dyn GpuOracle> {
    #[cfg(feature = "nvml")]
    {
        if settings.nvml {
            match NvmlOracle::new(settings.device_id) {
                Ok(oracle) => return Box::new(oracle),
                Err(e) => {
                    tracing::warn!(error = %e, "NVML probe failed at startup, falling back to no-op GPU oracle");
                }
            }
        }
    }
    let _ = settings;
    Box::new(NoGpuOracle)
}
