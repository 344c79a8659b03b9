use std::sync::Arc;

use super::MetricsContext;
use super::model::{GpuSnapshot, VulkanInfo};
use crate::arbitration::{self, GPU_TABLE};
use crate::collector::sysfs::{kgsl, thermal};
use crate::collector::{Clock, FileSystem};
use crate::error::{SampleError, join_errors};
use crate::history::CounterSample;
use crate::probe::CapabilityResult;
use crate::rates::busy_percent;

const GPU_STREAM: &str = "gpu:kgsl";

fn probe_error(result: &CapabilityResult) -> SampleError {
    if result.timed_out() {
        SampleError::ProbeTimeout
    } else {
        SampleError::ProbeFailure(result.error.clone().unwrap_or_default())
    }
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// GPU record. Starts the capability probe on first use.
    pub fn gpu_snapshot(&self) -> GpuSnapshot {
        let mut errors = Vec::new();
        let mut snapshot = GpuSnapshot {
            util_percent: -1.0,
            temp_c: -1.0,
            dedicated_budget_bytes: -1,
            dedicated_used_bytes: -1,
            shared_budget_bytes: -1,
            shared_used_bytes: -1,
            dedicated_total_bytes: -1,
            shared_total_bytes: -1,
            timestamp_ms: self.now_ms(),
            ..GpuSnapshot::default()
        };

        match self.sample_gpu_util() {
            Ok(util) => snapshot.util_percent = util,
            Err(e) => errors.push(e),
        }

        let readings = thermal::read_zones(&self.fs, &self.thermal_zones());
        match arbitration::choose(&readings, &GPU_TABLE, self.config.sanity_window) {
            Some(chosen) => {
                snapshot.temp_c = chosen.value_celsius;
                snapshot.temp_source = chosen.provenance;
                snapshot.temp_samples = chosen.sample_digest;
            }
            None => errors.push(SampleError::MissingResource("gpu temperature sensor".to_string())),
        }

        let probed = self.probe.get();
        match &probed.properties {
            Some(props) if probed.supported => {
                snapshot.vulkan_api_version = props.api_version_string();
                snapshot.vulkan_driver_version = props.driver_version_string();
                snapshot.has_memory_budget = props.has_memory_budget;
            }
            _ => errors.push(probe_error(&probed)),
        }
        match probed.memory() {
            Some(Ok(memory)) => {
                snapshot.dedicated_total_bytes = memory.dedicated_total_bytes;
                snapshot.shared_total_bytes = memory.shared_total_bytes;
                snapshot.has_memory_budget = memory.has_budget;
                if memory.has_budget {
                    snapshot.dedicated_budget_bytes = memory.dedicated_budget_bytes;
                    snapshot.dedicated_used_bytes = memory.dedicated_used_bytes;
                    snapshot.shared_budget_bytes = memory.shared_budget_bytes;
                    snapshot.shared_used_bytes = memory.shared_used_bytes;
                }
            }
            Some(Err(e)) => errors.push(SampleError::ProbeFailure(e.to_string())),
            None => {}
        }

        snapshot.gpu_name = kgsl::gpu_model(&self.fs, self.sys_root())
            .or_else(|| probed.properties.as_ref().map(|p| p.device_name.clone()))
            .unwrap_or_default();

        snapshot.error = join_errors(&errors);
        snapshot
    }

    /// GPU utilization: the driver's own percentage, else the busy share of
    /// cycle counters since the previous sample.
    pub(super) fn sample_gpu_util(&self) -> Result<f64, SampleError> {
        if let Some(pct) = kgsl::busy_percentage(&self.fs, self.sys_root()) {
            return Ok(pct);
        }
        let (busy, total) = kgsl::busy_counters(&self.fs, self.sys_root())
            .ok_or_else(|| SampleError::MissingResource("gpu utilization counters".to_string()))?;

        let sample = CounterSample::new(GPU_STREAM, self.now_ms())
            .with("busy", busy)
            .with("total", total);
        let (prev, _dt) = self.exchange(sample)?;
        let (Some(prev_busy), Some(prev_total)) = (prev.counter("busy"), prev.counter("total")) else {
            return Err(SampleError::StaleSample);
        };
        Ok(busy_percent(prev_busy, busy, prev_total, total))
    }

    /// Summary of the capability probe. Starts the probe on first use.
    pub fn vulkan_info(&self) -> VulkanInfo {
        let probed: Arc<CapabilityResult> = self.probe.get();
        let mut info = VulkanInfo {
            vulkan_supported: probed.supported,
            error: probed.error.clone().unwrap_or_default(),
            ..VulkanInfo::default()
        };
        if let Some(props) = &probed.properties {
            info.instance_version = props.instance_version_string();
            info.device_api_version = props.api_version_string();
            info.driver_version = props.driver_version_string();
            info.vendor_id = props.vendor_id;
            info.device_id = props.device_id;
            info.device_name = props.device_name.clone();
        }
        info
    }
}
