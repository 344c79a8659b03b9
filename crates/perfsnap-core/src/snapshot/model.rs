//! Snapshot records.
//!
//! Every record is complete: fields that could not be measured hold a
//! sentinel (`-1` or an empty string) and the reason is in `error`, which
//! is empty when everything was measured.

use serde::Serialize;

/// CPU domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    pub cpu_name: String,
    pub cores_physical: i32,
    pub cores_logical: i32,
    /// Busy share since the previous CPU sample; -1 before one exists.
    pub usage_percent: f64,
    #[serde(rename = "maxFreqKHz")]
    pub max_freq_khz: i64,
    pub processes: i32,
    pub threads: i64,
    /// Allocated file handles system-wide.
    pub handles: i64,
    pub uptime_seconds: i64,
    /// Cores per frequency cluster, fastest first: `1+3+4`.
    pub core_layout: String,
    /// Same, labelled: `1P + 3P + 4E`.
    pub core_layout_labeled: String,
    pub cpu_temp_c: f64,
    /// Where the temperature came from: `thermal_zone:cpu(median)`, `hwmon:tsens/temp1_input`.
    pub cpu_temp_source: String,
    pub cpu_temp_raw: i64,
    pub cpu_temp_candidates: String,
    pub cpu_temp_unit_assumption: String,
    pub timestamp_ms: i64,
    pub error: String,
}

/// Memory domain, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total_bytes: i64,
    pub used_bytes: i64,
    pub available_bytes: i64,
    pub cached_bytes: i64,
    pub compressed_bytes: i64,
    pub committed_used_bytes: i64,
    pub committed_limit_bytes: i64,
    pub timestamp_ms: i64,
    pub error: String,
}

/// Disk domain for the filesystem at one mount point.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSnapshot {
    pub total_bytes: i64,
    pub used_bytes: i64,
    pub available_bytes: i64,
    pub read_bps: i64,
    pub write_bps: i64,
    pub active_time_pct: f64,
    pub avg_response_ms: f64,
    pub mount_point: String,
    pub block_device: String,
    pub timestamp_ms: i64,
    pub error: String,
}

/// Network domain for the active interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetSnapshot {
    pub iface: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub rx_packets: i64,
    pub tx_packets: i64,
    pub rx_bps: i64,
    pub tx_bps: i64,
    pub timestamp_ms: i64,
    pub error: String,
}

/// GPU domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuSnapshot {
    pub gpu_name: String,
    pub util_percent: f64,
    pub temp_c: f64,
    pub temp_source: String,
    pub temp_samples: String,
    pub vulkan_api_version: String,
    pub vulkan_driver_version: String,
    pub dedicated_budget_bytes: i64,
    pub dedicated_used_bytes: i64,
    pub shared_budget_bytes: i64,
    pub shared_used_bytes: i64,
    pub dedicated_total_bytes: i64,
    pub shared_total_bytes: i64,
    pub has_memory_budget: bool,
    pub timestamp_ms: i64,
    pub error: String,
}

/// Capability probe summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VulkanInfo {
    pub vulkan_supported: bool,
    pub instance_version: String,
    pub device_api_version: String,
    pub driver_version: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub device_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniCpu {
    pub util: f64,
    #[serde(rename = "maxFreqKHz")]
    pub max_freq_khz: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniMemory {
    pub used_bytes: i64,
    pub total_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniDisk {
    pub read_bps: i64,
    pub write_bps: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniNet {
    pub iface: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniGpu {
    pub util: f64,
}

/// Compact all-domain record for frequent polling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniSnapshot {
    pub timestamp_ms: i64,
    pub cpu: MiniCpu,
    pub mem: MiniMemory,
    pub disk: MiniDisk,
    pub net: MiniNet,
    pub gpu: MiniGpu,
    pub error: String,
}
