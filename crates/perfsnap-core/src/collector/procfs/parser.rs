//! Parsers for `/proc` and `/sys` counter files.
//!
//! These are pure functions that parse the content of pseudo-files into
//! structured data. They are designed to be easily testable with string inputs.

use std::collections::BTreeSet;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Aggregate CPU tick counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTotals {
    /// Sum of every tick column.
    pub total: i64,
    /// Ticks spent idle or waiting for I/O.
    pub idle: i64,
}

impl CpuTotals {
    /// Ticks spent doing anything but idling.
    pub fn busy(&self) -> i64 {
        self.total.saturating_sub(self.idle).max(0)
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Format: `cpu user nice system idle iowait irq softirq steal guest guest_nice`.
/// Kernels older than 2.6.33 report fewer columns; missing ones count as zero.
pub fn parse_cpu_totals(content: &str) -> Result<CpuTotals, ParseError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ParseError::new("missing aggregate cpu line in stat"))?;

    let values: Vec<i64> = line
        .split_whitespace()
        .skip(1)
        .map(|s| s.parse().map_err(|_| ParseError::new(format!("invalid tick value '{}'", s))))
        .collect::<Result<_, _>>()?;

    if values.len() < 4 {
        return Err(ParseError::new(format!(
            "not enough cpu columns: expected 4+, got {}",
            values.len()
        )));
    }

    let get = |idx: usize| values.get(idx).copied().unwrap_or(0);
    let total = values.iter().take(10).fold(0i64, |acc, &v| acc.saturating_add(v));

    Ok(CpuTotals {
        total,
        idle: get(3).saturating_add(get(4)),
    })
}

/// Parsed data from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub mem_total: i64,
    pub mem_available: i64,
    pub cached: i64,
    pub compressed: i64,
    pub committed_as: i64,
    pub commit_limit: i64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value: i64 = value.parse().unwrap_or(0);
        match key {
            "MemTotal:" => {
                info.mem_total = value;
                seen_total = true;
            }
            "MemAvailable:" => info.mem_available = value,
            "Cached:" => info.cached = value,
            "Compressed:" => info.compressed = value,
            "Committed_AS:" => info.committed_as = value,
            "CommitLimit:" => info.commit_limit = value,
            _ => {}
        }
    }

    if !seen_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }
    Ok(info)
}

/// Counters from `/sys/block/<dev>/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStat {
    /// Number of reads completed
    pub reads: i64,
    /// Number of sectors read
    pub sectors_read: i64,
    /// Time spent reading (ms)
    pub read_ticks: i64,
    /// Number of writes completed
    pub writes: i64,
    /// Number of sectors written
    pub sectors_written: i64,
    /// Time spent writing (ms)
    pub write_ticks: i64,
    /// Time the device had I/O in flight (ms)
    pub io_ticks: i64,
}

/// Parses `/sys/block/<dev>/stat`.
///
/// Format: reads r_merged r_sectors r_ticks writes w_merged w_sectors w_ticks in_flight io_ticks time_in_queue [discard ... flush ...]
pub fn parse_block_stat(content: &str) -> Result<BlockStat, ParseError> {
    let values: Vec<i64> = content
        .split_whitespace()
        .take(11)
        .map(|s| s.parse().map_err(|_| ParseError::new(format!("invalid block counter '{}'", s))))
        .collect::<Result<_, _>>()?;

    if values.len() < 11 {
        return Err(ParseError::new(format!(
            "not enough fields in block stat: expected 11, got {}",
            values.len()
        )));
    }

    Ok(BlockStat {
        reads: values[0],
        sectors_read: values[2],
        read_ticks: values[3],
        writes: values[4],
        sectors_written: values[6],
        write_ticks: values[7],
        io_ticks: values[9],
    })
}

/// Finds the source device of the filesystem mounted at `mount_point` in `/proc/mounts`.
///
/// Later entries win, matching the kernel's view of stacked mounts.
pub fn parse_mount_source(content: &str, mount_point: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let source = parts.next()?;
            let target = parts.next()?;
            (target == mount_point).then(|| source.to_string())
        })
        .last()
}

/// Reduces a mount source to a block device name: `/dev/block/dm-5` → `dm-5`.
///
/// Sources outside `/dev/` (tmpfs, overlay, ...) are returned unchanged.
pub fn block_device_name(source: &str) -> String {
    if source.starts_with("/dev/") {
        source.rsplit('/').next().unwrap_or(source).to_string()
    } else {
        source.to_string()
    }
}

/// Parsed data from `/proc/net/dev` for one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDevStats {
    /// Interface name (wlan0, lo, etc.)
    pub interface: String,
    pub rx_bytes: i64,
    pub rx_packets: i64,
    pub tx_bytes: i64,
    pub tx_packets: i64,
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
///
/// Lines with fewer than 16 counters are skipped.
pub fn parse_net_dev(content: &str) -> Vec<NetDevStats> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') {
            continue;
        }
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };

        let interface = name.trim();
        if interface.is_empty() {
            continue;
        }

        let values: Vec<i64> = counters
            .split_whitespace()
            .map_while(|s| s.parse().ok())
            .collect();
        if values.len() < 16 {
            continue;
        }

        devices.push(NetDevStats {
            interface: interface.to_string(),
            rx_bytes: values[0],
            rx_packets: values[1],
            tx_bytes: values[8],
            tx_packets: values[9],
        });
    }

    devices
}

/// Parses a kernel CPU list such as `0-3,5,7-8` or `0 1 2 3`.
///
/// Malformed tokens are ignored.
pub fn parse_cpu_list(content: &str) -> BTreeSet<u32> {
    let mut cpus = BTreeSet::new();
    for token in content.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    cpus.extend(start..=end);
                }
            }
            None => {
                if let Ok(cpu) = token.parse() {
                    cpus.insert(cpu);
                }
            }
        }
    }
    cpus
}

/// Extracts a CPU model name from `/proc/cpuinfo`.
///
/// Looks at `Hardware`, `model name` and `Processor` lines, first non-empty wins.
pub fn parse_cpuinfo_name(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim();
        let value = value.trim();
        let relevant = key == "Hardware" || key == "model name" || key == "Processor";
        (relevant && !value.is_empty()).then(|| value.to_string())
    })
}

/// Parses the first line of `/proc/uptime` into whole seconds.
pub fn parse_uptime_secs(content: &str) -> Result<i64, ParseError> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty uptime"))?;
    let secs: f64 = first
        .parse()
        .map_err(|_| ParseError::new(format!("invalid uptime '{}'", first)))?;
    Ok(secs as i64)
}

/// Parses kgsl `gpubusy`: `<busy> <total>` cycle counters.
pub fn parse_gpubusy(content: &str) -> Result<(i64, i64), ParseError> {
    let mut parts = content.split_whitespace();
    let mut next = |name: &str| -> Result<i64, ParseError> {
        parts
            .next()
            .ok_or_else(|| ParseError::new(format!("missing {} in gpubusy", name)))?
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {} in gpubusy", name)))
    };
    let busy = next("busy")?;
    let total = next("total")?;
    Ok((busy, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_totals() {
        let content = "cpu  10000 500 3000 80000 1000 200 100 0 0 0\ncpu0 1 2 3 4 5 6 7 0 0 0\n";
        let totals = parse_cpu_totals(content).unwrap();
        assert_eq!(totals.total, 94800);
        assert_eq!(totals.idle, 81000);
        assert_eq!(totals.busy(), 13800);
    }

    #[test]
    fn test_parse_cpu_totals_short_line() {
        let totals = parse_cpu_totals("cpu 10 0 5 85\n").unwrap();
        assert_eq!(totals.total, 100);
        assert_eq!(totals.idle, 85);
    }

    #[test]
    fn test_parse_cpu_totals_saturates() {
        let max = i64::MAX;
        let content = format!("cpu {} {} 0 {} {} 0 0 0 0 0\n", max, max, max, max);
        let totals = parse_cpu_totals(&content).unwrap();
        assert_eq!(totals.total, i64::MAX);
        assert_eq!(totals.idle, i64::MAX);
        assert_eq!(totals.busy(), 0);
    }

    #[test]
    fn test_parse_cpu_totals_errors() {
        assert!(parse_cpu_totals("cpu0 1 2 3 4\n").is_err());
        assert!(parse_cpu_totals("cpu 1 2\n").is_err());
        assert!(parse_cpu_totals("cpu 1 x 3 4\n").is_err());
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    3000000 kB
Cached:          2000000 kB
SwapCached:        10000 kB
CommitLimit:     7000000 kB
Committed_AS:    9000000 kB
";
        let info = parse_meminfo(content).unwrap();
        assert_eq!(info.mem_total, 8000000);
        assert_eq!(info.mem_available, 3000000);
        assert_eq!(info.cached, 2000000);
        assert_eq!(info.compressed, 0);
        assert_eq!(info.committed_as, 9000000);
        assert_eq!(info.commit_limit, 7000000);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_block_stat() {
        let content = "    1000        0     1000      500      400        0     2000      700        0      800     1200        0        0        0        0\n";
        let stat = parse_block_stat(content).unwrap();
        assert_eq!(stat.reads, 1000);
        assert_eq!(stat.sectors_read, 1000);
        assert_eq!(stat.read_ticks, 500);
        assert_eq!(stat.writes, 400);
        assert_eq!(stat.sectors_written, 2000);
        assert_eq!(stat.write_ticks, 700);
        assert_eq!(stat.io_ticks, 800);
        assert!(parse_block_stat("1 2 3\n").is_err());
        assert!(parse_block_stat("").is_err());
    }

    #[test]
    fn test_parse_mount_source() {
        let content = "\
/dev/block/dm-5 /data ext4 rw 0 0
tmpfs /dev tmpfs rw 0 0
/dev/block/dm-7 /data f2fs rw 0 0
";
        assert_eq!(parse_mount_source(content, "/data").as_deref(), Some("/dev/block/dm-7"));
        assert_eq!(parse_mount_source(content, "/dev").as_deref(), Some("tmpfs"));
        assert_eq!(parse_mount_source(content, "/system"), None);
    }

    #[test]
    fn test_block_device_name() {
        assert_eq!(block_device_name("/dev/block/dm-5"), "dm-5");
        assert_eq!(block_device_name("/dev/sda1"), "sda1");
        assert_eq!(block_device_name("overlay"), "overlay");
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  wlan0:987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
  bad0: 1 2 3
";
        let devices = parse_net_dev(content);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].interface, "lo");
        assert_eq!(devices[1].interface, "wlan0");
        assert_eq!(devices[1].rx_bytes, 987654321);
        assert_eq!(devices[1].rx_packets, 654321);
        assert_eq!(devices[1].tx_bytes, 123456789);
        assert_eq!(devices[1].tx_packets, 456789);
    }

    #[test]
    fn test_parse_cpu_list() {
        let cpus: Vec<u32> = parse_cpu_list("0-3,5,7-8\n").into_iter().collect();
        assert_eq!(cpus, vec![0, 1, 2, 3, 5, 7, 8]);
        assert_eq!(parse_cpu_list("4 5 6\n").len(), 3);
        assert_eq!(parse_cpu_list("7").len(), 1);
        assert!(parse_cpu_list("").is_empty());
        assert_eq!(parse_cpu_list("x,1").len(), 1);
    }

    #[test]
    fn test_parse_cpuinfo_name() {
        let arm = "processor\t: 0\nHardware\t: Qualcomm SM8550\n";
        assert_eq!(parse_cpuinfo_name(arm).as_deref(), Some("Qualcomm SM8550"));

        let x86 = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Core(TM) i7\n";
        assert_eq!(parse_cpuinfo_name(x86).as_deref(), Some("Intel(R) Core(TM) i7"));

        assert_eq!(parse_cpuinfo_name("Hardware\t:\n"), None);
    }

    #[test]
    fn test_parse_uptime_and_gpubusy() {
        assert_eq!(parse_uptime_secs("12345.67 98765.43\n").unwrap(), 12345);
        assert!(parse_uptime_secs("").is_err());

        assert_eq!(parse_gpubusy("  1000  5000\n").unwrap(), (1000, 5000));
        assert!(parse_gpubusy("1000\n").is_err());
    }
}
