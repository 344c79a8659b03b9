use super::MetricsContext;
use super::memory::kib_to_bytes;
use super::model::{MiniCpu, MiniDisk, MiniGpu, MiniMemory, MiniNet, MiniSnapshot};
use crate::collector::sysfs::cpu;
use crate::collector::{Clock, FileSystem};
use crate::error::{SampleError, join_errors};

/// Collects distinct errors in first-seen order.
#[derive(Default)]
struct Errors(Vec<SampleError>);

impl Errors {
    fn take<T>(&mut self, result: Result<T, SampleError>, fallback: T) -> T {
        result.unwrap_or_else(|e| {
            if !self.0.contains(&e) {
                self.0.push(e);
            }
            fallback
        })
    }
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Compact record of every domain.
    ///
    /// Shares history streams with the full snapshots, so interleaving the
    /// two shortens the interval each one measures.
    pub fn mini_snapshot(&self) -> MiniSnapshot {
        let mut errors = Errors::default();

        let cpu = MiniCpu {
            util: errors.take(self.sample_cpu_usage(), -1.0),
            max_freq_khz: cpu::max_current_freq_khz(&self.fs, self.sys_root()),
        };

        let mem = errors
            .take(self.read_meminfo().map(Some), None)
            .map(|info| {
                let total = kib_to_bytes(info.mem_total);
                MiniMemory {
                    used_bytes: total.saturating_sub(kib_to_bytes(info.mem_available)).max(0),
                    total_bytes: total,
                }
            })
            .unwrap_or(MiniMemory {
                used_bytes: -1,
                total_bytes: -1,
            });

        let disk = errors
            .take(
                self.mount_device()
                    .and_then(|device| self.sample_disk_rates(&device))
                    .map(Some),
                None,
            )
            .map(|rates| MiniDisk {
                read_bps: rates.read_bps,
                write_bps: rates.write_bps,
            })
            .unwrap_or(MiniDisk {
                read_bps: -1,
                write_bps: -1,
            });

        let net = errors
            .take(self.active_interface().map(Some), None)
            .map(|stats| MiniNet {
                iface: stats.interface,
                rx_bytes: stats.rx_bytes,
                tx_bytes: stats.tx_bytes,
            })
            .unwrap_or(MiniNet {
                iface: String::new(),
                rx_bytes: -1,
                tx_bytes: -1,
            });

        let gpu = MiniGpu {
            util: errors.take(self.sample_gpu_util(), -1.0),
        };

        MiniSnapshot {
            timestamp_ms: self.now_ms(),
            cpu,
            mem,
            disk,
            net,
            gpu,
            error: join_errors(&errors.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_mini_snapshot() {
        let (ctx, _fs, _clock) = device_context();
        let mini = ctx.mini_snapshot();

        assert_eq!(mini.cpu.util, -1.0);
        assert_eq!(mini.cpu.max_freq_khz, 2_995_200);
        assert_eq!(mini.mem.total_bytes, 8_000_000 * 1024);
        assert_eq!(mini.mem.used_bytes, 5_000_000 * 1024);
        assert_eq!(mini.disk.read_bps, -1);
        assert_eq!(mini.net.iface, "wlan0");
        assert_eq!(mini.net.rx_bytes, 987_654_321);
        assert_eq!(mini.gpu.util, 37.0);
        // reported once for both delta domains
        assert_eq!(mini.error, "no previous sample yet");
    }

    #[test]
    fn test_mini_shares_streams_with_full_snapshots() {
        let (ctx, fs, clock) = device_context();
        ctx.disk_snapshot();

        fs.set_block_stat("dm-5", 1000, 3000, 500, 400, 2000, 700, 800);
        clock.advance(1000);
        let mini = ctx.mini_snapshot();
        assert_eq!(mini.disk.read_bps, 1_024_000);
        assert_eq!(mini.disk.write_bps, 0);

        // net cumulative counters are read without touching history
        assert!(ctx.history().get("net:wlan0").is_none());
    }

    #[test]
    fn test_mini_serializes_nested_camel_case() {
        let (ctx, _fs, _clock) = device_context();
        let json = serde_json::to_value(ctx.mini_snapshot()).unwrap();
        assert_eq!(json["cpu"]["maxFreqKHz"], 2_995_200);
        assert_eq!(json["mem"]["totalBytes"], 8_000_000i64 * 1024);
        assert_eq!(json["disk"]["readBps"], -1);
        assert_eq!(json["net"]["rxBytes"], 987_654_321);
        assert!(json.get("timestampMs").is_some());
    }

    #[test]
    fn test_concurrent_snapshots_share_cpu_stream() {
        let (ctx, fs, clock) = device_context();
        let ctx = Arc::new(ctx);

        let mut handles = Vec::new();
        for i in 0..8 {
            let ctx = Arc::clone(&ctx);
            handles.push(thread::spawn(move || {
                let mut usages = Vec::new();
                for _ in 0..50 {
                    if i % 2 == 0 {
                        usages.push(ctx.cpu_snapshot().usage_percent);
                    } else {
                        usages.push(ctx.mini_snapshot().cpu.util);
                    }
                }
                usages
            }));
        }
        for tick in 1..=50i64 {
            fs.add_file(
                "/proc/stat",
                format!("cpu  {} 500 3000 {} 1000 200 100 0 0 0\n", 10000 + tick * 30, 80000 + tick * 70),
            );
            clock.advance(10);
        }

        for handle in handles {
            for usage in handle.join().unwrap() {
                assert!(usage == -1.0 || (0.0..=100.0).contains(&usage), "{}", usage);
            }
        }

        let stored = ctx.history().get("cpu:global").unwrap();
        assert!(stored.counter("total").is_some());

        fs.add_file("/proc/stat", "cpu  20000 500 3000 90000 1000 200 100 0 0 0\n");
        clock.advance(1000);
        let usage = ctx.mini_snapshot().cpu.util;
        assert!((0.0..=100.0).contains(&usage), "{}", usage);
    }
}
