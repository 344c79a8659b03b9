//! Per-domain snapshot assembly.
//!
//! [`MetricsContext`] owns everything the sampling engine remembers between
//! calls: the counter history, short-lived discovery caches and the GPU
//! capability probe. Its methods never fail; each returns a complete record
//! with problems described in the record's `error` field.
//!
//! ```
//! use std::sync::Arc;
//! use perfsnap_core::collector::{ManualClock, MockFs};
//! use perfsnap_core::probe::{ProbeError, StaticProvider};
//! use perfsnap_core::snapshot::MetricsContext;
//! use perfsnap_core::SamplerConfig;
//!
//! let fs = MockFs::typical_device();
//! let clock = ManualClock::new(0);
//! let provider = Arc::new(StaticProvider::failing(ProbeError::NoDevices));
//! let ctx = MetricsContext::new(fs, clock.clone(), SamplerConfig::default(), provider);
//!
//! let first = ctx.cpu_snapshot();
//! assert_eq!(first.usage_percent, -1.0);
//! clock.advance(1000);
//! let second = ctx.cpu_snapshot();
//! assert_eq!(second.usage_percent, 0.0);
//! ```

mod cpu;
mod disk;
mod gpu;
mod memory;
mod mini;
pub mod model;
mod net;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::collector::sysfs::thermal::{self, ThermalZone};
use crate::collector::{Clock, FileSystem, MonotonicClock, RealFs};
use crate::config::SamplerConfig;
use crate::error::SampleError;
use crate::history::{CounterSample, SampleHistory};
use crate::probe::{CapabilityProbe, CapabilityProvider, VulkanProvider};

pub use model::{
    CpuSnapshot, DiskSnapshot, GpuSnapshot, MemorySnapshot, MiniCpu, MiniDisk, MiniGpu, MiniMemory,
    MiniNet, MiniSnapshot, NetSnapshot, VulkanInfo,
};

/// A value remembered together with the monotonic time it was produced.
#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    at_ms: i64,
}

/// Sampling context shared by all snapshot calls.
///
/// `Send + Sync`: wrap it in an `Arc` to poll from several threads. Each
/// shared table has its own mutex; none is held across another's lock.
pub struct MetricsContext<F: FileSystem, C: Clock = MonotonicClock> {
    fs: F,
    clock: C,
    config: SamplerConfig,
    history: SampleHistory,
    /// Thermal zones, rediscovered after `discovery_ttl_ms`.
    zones: Mutex<Option<Cached<Vec<ThermalZone>>>>,
    /// Block device backing the configured mount point.
    mount_device: Mutex<Option<Cached<String>>>,
    probe: CapabilityProbe,
}

impl MetricsContext<RealFs, MonotonicClock> {
    /// Context over the live system, probing the GPU through Vulkan.
    pub fn system(config: SamplerConfig) -> Self {
        Self::new(RealFs::new(), MonotonicClock::new(), config, Arc::new(VulkanProvider::new()))
    }
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Creates a context.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `clock` - Monotonic time source for sample timestamps
    /// * `config` - Paths, mount point, timeouts
    /// * `provider` - GPU capability provider, probed lazily on first GPU request
    pub fn new(fs: F, clock: C, config: SamplerConfig, provider: Arc<dyn CapabilityProvider>) -> Self {
        let probe = CapabilityProbe::new(provider, config.probe_timeout);
        Self {
            fs,
            clock,
            config,
            history: SampleHistory::new(),
            zones: Mutex::new(None),
            mount_device: Mutex::new(None),
            probe,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn probe(&self) -> &CapabilityProbe {
        &self.probe
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn proc_path(&self, rel: &str) -> PathBuf {
        self.config.proc_root.join(rel)
    }

    fn sys_root(&self) -> &Path {
        &self.config.sys_root
    }

    fn read_proc(&self, rel: &str) -> Result<String, SampleError> {
        let path = self.proc_path(rel);
        self.fs
            .read_to_string(&path)
            .map_err(|e| SampleError::missing(&path, e))
    }

    fn is_fresh(&self, at_ms: i64) -> bool {
        self.now_ms() - at_ms < self.config.discovery_ttl_ms
    }

    /// Stores `sample` and returns the previous sample of the same stream
    /// together with the elapsed time.
    ///
    /// Fails with `StaleSample` on the first sample of a stream or when no
    /// time has passed since the previous one.
    fn exchange(&self, sample: CounterSample) -> Result<(CounterSample, i64), SampleError> {
        let stream_id = sample.stream_id.clone();
        let now = sample.timestamp_ms;
        let prev = self
            .history
            .store(&stream_id, sample)
            .ok_or(SampleError::StaleSample)?;
        let dt = now - prev.timestamp_ms;
        if dt <= 0 {
            debug!(stream = %stream_id, dt, "no time elapsed since previous sample");
            return Err(SampleError::StaleSample);
        }
        Ok((prev, dt))
    }

    /// Thermal zones, discovered at most once per `discovery_ttl_ms`.
    fn thermal_zones(&self) -> Vec<ThermalZone> {
        // Held across discovery so concurrent callers scan once
        let mut cache = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref()
            && self.is_fresh(cached.at_ms)
        {
            return cached.value.clone();
        }
        let zones = thermal::discover_zones(&self.fs, self.sys_root());
        if zones.is_empty() {
            // Nothing found yet; rescan on the next call
            *cache = None;
        } else {
            *cache = Some(Cached {
                value: zones.clone(),
                at_ms: self.now_ms(),
            });
        }
        zones
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::collector::{ManualClock, MockFs};
    use crate::probe::{GpuMemory, GpuProperties, ProbeError, StaticProvider};

    pub fn device_config() -> SamplerConfig {
        SamplerConfig {
            mount_point: PathBuf::from("/data"),
            ..SamplerConfig::default()
        }
    }

    pub fn adreno() -> GpuProperties {
        GpuProperties {
            device_name: "Adreno (TM) 740".to_string(),
            vendor_id: 0x5143,
            device_id: 0x43050a01,
            instance_version: (1 << 22) | (3 << 12) | 239,
            api_version: (1 << 22) | (3 << 12) | 128,
            driver_version: 0x8029_0000,
            has_memory_budget: true,
        }
    }

    pub fn adreno_memory() -> GpuMemory {
        GpuMemory {
            dedicated_total_bytes: 0,
            shared_total_bytes: 8 << 30,
            dedicated_budget_bytes: 0,
            dedicated_used_bytes: 0,
            shared_budget_bytes: 6 << 30,
            shared_used_bytes: 1 << 30,
            has_budget: true,
        }
    }

    /// Typical device, clock at 0, GPU probe failing.
    pub fn device_context() -> (MetricsContext<MockFs, ManualClock>, MockFs, ManualClock) {
        let fs = MockFs::typical_device();
        let clock = ManualClock::new(0);
        let provider = Arc::new(StaticProvider::failing(ProbeError::BackendNotFound(
            "libvulkan.so: cannot open shared object file".to_string(),
        )));
        let ctx = MetricsContext::new(fs.clone(), clock.clone(), device_config(), provider);
        (ctx, fs, clock)
    }

    /// Typical device with a supported GPU.
    pub fn gpu_context() -> (MetricsContext<MockFs, ManualClock>, MockFs, ManualClock) {
        let fs = MockFs::typical_device();
        let clock = ManualClock::new(0);
        let provider = Arc::new(StaticProvider::supported(adreno(), Some(adreno_memory())));
        let ctx = MetricsContext::new(fs.clone(), clock.clone(), device_config(), provider);
        (ctx, fs, clock)
    }
}
