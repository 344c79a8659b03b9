//! Sampler configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::arbitration::SanityWindow;

/// Tunables of a [`crate::snapshot::MetricsContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Root of the proc filesystem.
    pub proc_root: PathBuf,
    /// Root of the sys filesystem.
    pub sys_root: PathBuf,
    /// Mount point whose filesystem and block device the disk domain reports.
    pub mount_point: PathBuf,
    /// Longest any caller waits for the capability probe.
    pub probe_timeout: Duration,
    /// How long discovered thermal zones and the mount device are reused.
    pub discovery_ttl_ms: i64,
    /// Plausible temperature range for arbitration.
    pub sanity_window: SanityWindow,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            mount_point: PathBuf::from("/"),
            probe_timeout: Duration::from_secs(2),
            discovery_ttl_ms: 10_000,
            sanity_window: SanityWindow::default(),
        }
    }
}
