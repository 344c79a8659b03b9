use std::path::PathBuf;
use std::sync::PoisonError;

use tracing::debug;

use super::model::DiskSnapshot;
use super::{Cached, MetricsContext};
use crate::collector::procfs::parser::{self, BlockStat};
use crate::collector::{Clock, FileSystem};
use crate::error::{SampleError, join_errors};
use crate::history::CounterSample;
use crate::rates::{average_per_op, clamped_delta, interval_percent, rate};

const DEFAULT_SECTOR_SIZE: i64 = 512;

/// Throughput and latency of the block device over the last interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct DiskRates {
    pub read_bps: i64,
    pub write_bps: i64,
    pub active_time_pct: f64,
    pub avg_response_ms: f64,
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Disk record for the configured mount point.
    pub fn disk_snapshot(&self) -> DiskSnapshot {
        let mount_point = self.config.mount_point.clone();
        let mut errors = Vec::new();
        let mut snapshot = DiskSnapshot {
            total_bytes: -1,
            used_bytes: -1,
            available_bytes: -1,
            read_bps: -1,
            write_bps: -1,
            active_time_pct: -1.0,
            avg_response_ms: -1.0,
            mount_point: mount_point.display().to_string(),
            timestamp_ms: self.now_ms(),
            ..DiskSnapshot::default()
        };

        match self.fs.fs_usage(&mount_point) {
            Ok(usage) => {
                snapshot.total_bytes = usage.total_bytes;
                snapshot.available_bytes = usage.available_bytes;
                snapshot.used_bytes = usage.used_bytes();
            }
            Err(e) => errors.push(SampleError::missing(&mount_point, e)),
        }

        match self.mount_device() {
            Ok(device) => {
                match self.sample_disk_rates(&device) {
                    Ok(rates) => {
                        snapshot.read_bps = rates.read_bps;
                        snapshot.write_bps = rates.write_bps;
                        snapshot.active_time_pct = rates.active_time_pct;
                        snapshot.avg_response_ms = rates.avg_response_ms;
                    }
                    Err(e) => errors.push(e),
                }
                snapshot.block_device = device;
            }
            Err(e) => errors.push(e),
        }

        snapshot.error = join_errors(&errors);
        snapshot
    }

    /// Block device backing the configured mount point, from `/proc/mounts`.
    ///
    /// Resolved at most once per `discovery_ttl_ms`; failures are not cached.
    pub(super) fn mount_device(&self) -> Result<String, SampleError> {
        let mut cache = self.mount_device.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref()
            && self.is_fresh(cached.at_ms)
        {
            return Ok(cached.value.clone());
        }

        let mounts = self.read_proc("mounts")?;
        let mount_point = self.config.mount_point.display().to_string();
        let source = parser::parse_mount_source(&mounts, &mount_point).ok_or_else(|| {
            SampleError::MissingResource(format!("no mount entry for {}", mount_point))
        })?;
        let device = parser::block_device_name(&source);
        debug!(mount = %mount_point, device = %device, "resolved mount device");

        *cache = Some(Cached {
            value: device.clone(),
            at_ms: self.now_ms(),
        });
        Ok(device)
    }

    fn read_block_stat(&self, device: &str) -> Result<BlockStat, SampleError> {
        let candidates: [PathBuf; 2] = [
            self.sys_root().join("block").join(device).join("stat"),
            self.sys_root().join("class/block").join(device).join("stat"),
        ];
        let mut last_error = None;
        for path in &candidates {
            match self.fs.read_to_string(path) {
                Ok(content) => return Ok(parser::parse_block_stat(&content)?),
                Err(e) => last_error = Some(SampleError::missing(path, e)),
            }
        }
        Err(last_error.unwrap_or_else(|| SampleError::MissingResource(device.to_string())))
    }

    fn sector_size(&self, device: &str) -> i64 {
        self.fs
            .read_int(&self.sys_root().join("block").join(device).join("queue/logical_block_size"))
            .filter(|&size| size > 0)
            .unwrap_or(DEFAULT_SECTOR_SIZE)
    }

    /// Rates of `device` since its previous sample.
    pub(super) fn sample_disk_rates(&self, device: &str) -> Result<DiskRates, SampleError> {
        let stat = self.read_block_stat(device)?;
        let sample = CounterSample::new(format!("disk:{}", device), self.now_ms())
            .with("reads", stat.reads)
            .with("writes", stat.writes)
            .with("sectors_read", stat.sectors_read)
            .with("sectors_written", stat.sectors_written)
            .with("read_ticks", stat.read_ticks)
            .with("write_ticks", stat.write_ticks)
            .with("io_ticks", stat.io_ticks);
        let (prev, dt) = self.exchange(sample)?;

        let sector = self.sector_size(device);
        let read_bps = rate(prev.counter("sectors_read"), stat.sectors_read, dt, sector);
        let write_bps = rate(prev.counter("sectors_written"), stat.sectors_written, dt, sector);
        let (Some(read_bps), Some(write_bps)) = (read_bps, write_bps) else {
            return Err(SampleError::StaleSample);
        };

        let delta = |name: &str, curr: i64| clamped_delta(prev.counter(name).unwrap_or(curr), curr);
        let active_time_pct = interval_percent(delta("io_ticks", stat.io_ticks), dt).unwrap_or(-1.0);
        let ops = delta("reads", stat.reads).saturating_add(delta("writes", stat.writes));
        let ticks = delta("read_ticks", stat.read_ticks).saturating_add(delta("write_ticks", stat.write_ticks));

        Ok(DiskRates {
            read_bps,
            write_bps,
            active_time_pct,
            avg_response_ms: average_per_op(ticks, ops),
        })
    }
}
