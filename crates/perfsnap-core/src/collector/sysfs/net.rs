//! Network interface state and active interface selection.

use std::path::Path;

use crate::collector::procfs::parser::NetDevStats;
use crate::collector::traits::FileSystem;

/// An interface is up when `operstate` says so or its carrier is present.
pub fn is_up<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path, iface: &str) -> bool {
    let dir = sys_root.join("class/net").join(iface);
    if fs
        .read_first_line(&dir.join("operstate"))
        .is_some_and(|state| state.eq_ignore_ascii_case("up"))
    {
        return true;
    }
    fs.read_first_line(&dir.join("carrier")).as_deref() == Some("1")
}

/// Picks the interface the device is most likely using.
///
/// Preference order, loopback never considered:
/// 1. first `wlan*` interface that is up
/// 2. first interface that is up
/// 3. first interface that has moved any bytes
/// 4. first interface
pub fn select_interface<'a, F: FileSystem + ?Sized>(
    fs: &F,
    sys_root: &Path,
    devices: &'a [NetDevStats],
) -> Option<&'a NetDevStats> {
    let candidates: Vec<&NetDevStats> = devices.iter().filter(|d| d.interface != "lo").collect();
    let up: Vec<&NetDevStats> = candidates
        .iter()
        .copied()
        .filter(|d| is_up(fs, sys_root, &d.interface))
        .collect();

    up.iter()
        .copied()
        .find(|d| d.interface.starts_with("wlan"))
        .or_else(|| up.first().copied())
        .or_else(|| {
            candidates
                .iter()
                .copied()
                .find(|d| d.rx_bytes.saturating_add(d.tx_bytes) > 0)
        })
        .or_else(|| candidates.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn dev(name: &str, rx: i64, tx: i64) -> NetDevStats {
        NetDevStats {
            interface: name.to_string(),
            rx_bytes: rx,
            tx_bytes: tx,
            ..Default::default()
        }
    }

    #[test]
    fn test_wlan_up_preferred() {
        let fs = MockFs::new();
        fs.add_file("/sys/class/net/eth0/operstate", "up\n");
        fs.add_file("/sys/class/net/wlan0/operstate", "up\n");
        let devices = vec![dev("lo", 9, 9), dev("eth0", 5, 5), dev("wlan0", 1, 1)];
        let chosen = select_interface(&fs, Path::new("/sys"), &devices).unwrap();
        assert_eq!(chosen.interface, "wlan0");
    }

    #[test]
    fn test_carrier_counts_as_up() {
        let fs = MockFs::new();
        fs.add_file("/sys/class/net/wlan0/operstate", "down\n");
        fs.add_file("/sys/class/net/rmnet0/operstate", "unknown\n");
        fs.add_file("/sys/class/net/rmnet0/carrier", "1\n");
        let devices = vec![dev("wlan0", 100, 100), dev("rmnet0", 0, 0)];
        assert!(is_up(&fs, Path::new("/sys"), "rmnet0"));
        assert!(!is_up(&fs, Path::new("/sys"), "wlan0"));
        let chosen = select_interface(&fs, Path::new("/sys"), &devices).unwrap();
        assert_eq!(chosen.interface, "rmnet0");
    }

    #[test]
    fn test_fallbacks_without_state() {
        let fs = MockFs::new();
        let devices = vec![dev("lo", 9, 9), dev("dummy0", 0, 0), dev("rmnet1", 10, 0)];
        let chosen = select_interface(&fs, Path::new("/sys"), &devices).unwrap();
        assert_eq!(chosen.interface, "rmnet1");

        let idle = vec![dev("lo", 9, 9), dev("dummy0", 0, 0)];
        let chosen = select_interface(&fs, Path::new("/sys"), &idle).unwrap();
        assert_eq!(chosen.interface, "dummy0");

        assert!(select_interface(&fs, Path::new("/sys"), &[dev("lo", 1, 1)]).is_none());
    }
}
