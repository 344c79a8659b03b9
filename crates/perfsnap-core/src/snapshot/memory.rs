use super::MetricsContext;
use super::model::MemorySnapshot;
use crate::collector::procfs::parser::{self, MemInfo};
use crate::collector::{Clock, FileSystem};
use crate::error::SampleError;

const KIB: i64 = 1024;

/// `/proc/meminfo` reports kibibytes.
pub(super) fn kib_to_bytes(kib: i64) -> i64 {
    kib.saturating_mul(KIB)
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Memory record from `/proc/meminfo`.
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        let timestamp_ms = self.now_ms();
        match self.read_meminfo() {
            Ok(info) => {
                let total = kib_to_bytes(info.mem_total);
                let available = kib_to_bytes(info.mem_available);
                MemorySnapshot {
                    total_bytes: total,
                    used_bytes: total.saturating_sub(available).max(0),
                    available_bytes: available,
                    cached_bytes: kib_to_bytes(info.cached),
                    compressed_bytes: kib_to_bytes(info.compressed),
                    committed_used_bytes: kib_to_bytes(info.committed_as),
                    committed_limit_bytes: kib_to_bytes(info.commit_limit),
                    timestamp_ms,
                    error: String::new(),
                }
            }
            Err(e) => MemorySnapshot {
                total_bytes: -1,
                used_bytes: -1,
                available_bytes: -1,
                cached_bytes: -1,
                compressed_bytes: -1,
                committed_used_bytes: -1,
                committed_limit_bytes: -1,
                timestamp_ms,
                error: e.to_string(),
            },
        }
    }

    pub(super) fn read_meminfo(&self) -> Result<MemInfo, SampleError> {
        Ok(parser::parse_meminfo(&self.read_proc("meminfo")?)?)
    }
}
