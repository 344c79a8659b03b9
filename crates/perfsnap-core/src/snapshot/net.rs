use super::MetricsContext;
use super::model::NetSnapshot;
use crate::collector::procfs::parser::{self, NetDevStats};
use crate::collector::sysfs::net;
use crate::collector::{Clock, FileSystem};
use crate::error::{SampleError, join_errors};
use crate::history::CounterSample;
use crate::rates::rate;

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Network record for the active interface.
    pub fn net_snapshot(&self) -> NetSnapshot {
        let mut snapshot = NetSnapshot {
            rx_bytes: -1,
            tx_bytes: -1,
            rx_packets: -1,
            tx_packets: -1,
            rx_bps: -1,
            tx_bps: -1,
            timestamp_ms: self.now_ms(),
            ..NetSnapshot::default()
        };

        let stats = match self.active_interface() {
            Ok(stats) => stats,
            Err(e) => {
                snapshot.error = e.to_string();
                return snapshot;
            }
        };
        snapshot.iface = stats.interface.clone();
        snapshot.rx_bytes = stats.rx_bytes;
        snapshot.tx_bytes = stats.tx_bytes;
        snapshot.rx_packets = stats.rx_packets;
        snapshot.tx_packets = stats.tx_packets;

        let mut errors = Vec::new();
        match self.sample_net_rates(&stats) {
            Ok((rx_bps, tx_bps)) => {
                snapshot.rx_bps = rx_bps;
                snapshot.tx_bps = tx_bps;
            }
            Err(e) => errors.push(e),
        }
        snapshot.error = join_errors(&errors);
        snapshot
    }

    /// Counters of the interface the device is most likely using.
    pub(super) fn active_interface(&self) -> Result<NetDevStats, SampleError> {
        let devices = parser::parse_net_dev(&self.read_proc("net/dev")?);
        net::select_interface(&self.fs, self.sys_root(), &devices)
            .cloned()
            .ok_or_else(|| SampleError::MissingResource("no network interface".to_string()))
    }

    fn sample_net_rates(&self, stats: &NetDevStats) -> Result<(i64, i64), SampleError> {
        let sample = CounterSample::new(format!("net:{}", stats.interface), self.now_ms())
            .with("rx_bytes", stats.rx_bytes)
            .with("tx_bytes", stats.tx_bytes);
        let (prev, dt) = self.exchange(sample)?;

        match (
            rate(prev.counter("rx_bytes"), stats.rx_bytes, dt, 1),
            rate(prev.counter("tx_bytes"), stats.tx_bytes, dt, 1),
        ) {
            (Some(rx), Some(tx)) => Ok((rx, tx)),
            _ => Err(SampleError::StaleSample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    const NET_DEV_HEADER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";

    #[test]
    fn test_selects_wlan_and_reports_cumulative_counters() {
        let (ctx, _fs, _clock) = device_context();
        let snap = ctx.net_snapshot();
        assert_eq!(snap.iface, "wlan0");
        assert_eq!(snap.rx_bytes, 987_654_321);
        assert_eq!(snap.rx_packets, 654_321);
        assert_eq!(snap.tx_bytes, 123_456_789);
        assert_eq!(snap.tx_packets, 456_789);
        assert_eq!(snap.rx_bps, -1);
        assert_eq!(snap.tx_bps, -1);
        assert_eq!(snap.error, "no previous sample yet");
    }

    #[test]
    fn test_net_rates_between_samples() {
        let (ctx, fs, clock) = device_context();
        ctx.net_snapshot();

        fs.add_file(
            "/proc/net/dev",
            format!(
                "{} wlan0: 987754321   654400    0    0    0     0          0         0 123466789   456800    0    0    0     0       0          0\n",
                NET_DEV_HEADER
            ),
        );
        clock.advance(2000);
        let snap = ctx.net_snapshot();
        assert_eq!(snap.rx_bps, 50_000);
        assert_eq!(snap.tx_bps, 5_000);
        assert_eq!(snap.error, "");
    }

    #[test]
    fn test_no_interfaces() {
        let (ctx, fs, _clock) = device_context();
        fs.add_file(
            "/proc/net/dev",
            format!(
                "{}    lo:  1     1    0    0    0     0          0         0   1     1    0    0    0     0       0          0\n",
                NET_DEV_HEADER
            ),
        );
        let snap = ctx.net_snapshot();
        assert_eq!(snap.iface, "");
        assert_eq!(snap.rx_bytes, -1);
        assert_eq!(snap.error, "missing resource: no network interface");
    }
}
