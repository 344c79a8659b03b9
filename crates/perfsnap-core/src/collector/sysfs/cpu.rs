//! CPU topology, frequency and naming from `devices/system/cpu`.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::{parse_cpu_list, parse_cpuinfo_name};
use crate::collector::traits::FileSystem;

fn cpu_dir(sys_root: &Path) -> PathBuf {
    sys_root.join("devices/system/cpu")
}

/// Names of `cpuN` directories, sorted.
fn numbered_cpus<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Vec<String> {
    fs.entry_names(&cpu_dir(sys_root))
        .into_iter()
        .filter(|name| {
            name.strip_prefix("cpu")
                .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect()
}

/// Names of `cpufreq/policyN` directories, sorted.
fn policies<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Vec<PathBuf> {
    let base = cpu_dir(sys_root).join("cpufreq");
    fs.entry_names(&base)
        .into_iter()
        .filter(|name| name.starts_with("policy"))
        .map(|name| base.join(name))
        .collect()
}

/// Counts logical CPUs from the `online` list, falling back to `cpuN` directories.
///
/// Returns 0 when neither source is available.
pub fn logical_cores<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> i32 {
    let online = fs
        .read_first_line(&cpu_dir(sys_root).join("online"))
        .map(|list| parse_cpu_list(&list).len())
        .unwrap_or(0);
    if online > 0 {
        return online as i32;
    }
    numbered_cpus(fs, sys_root).len() as i32
}

/// Counts physical cores.
///
/// Only differs from `logical` when SMT is active, in which case distinct
/// `physical_package_id:core_id` pairs are counted.
pub fn physical_cores<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path, logical: i32) -> i32 {
    let base = cpu_dir(sys_root);
    if fs.read_int(&base.join("smt/active")) != Some(1) {
        return logical;
    }

    let cores: HashSet<String> = numbered_cpus(fs, sys_root)
        .into_iter()
        .map(|name| {
            let topology = base.join(&name).join("topology");
            let package = fs
                .read_first_line(&topology.join("physical_package_id"))
                .unwrap_or_else(|| "0".to_string());
            let core = fs
                .read_first_line(&topology.join("core_id"))
                .unwrap_or_else(|| name[3..].to_string());
            format!("{}:{}", package, core)
        })
        .collect();

    if cores.is_empty() { logical } else { cores.len() as i32 }
}

fn current_freq<F: FileSystem + ?Sized>(fs: &F, dir: &Path) -> Option<i64> {
    fs.read_int(&dir.join("scaling_cur_freq"))
        .filter(|&f| f > 0)
        .or_else(|| fs.read_int(&dir.join("cpuinfo_cur_freq")))
        .filter(|&f| f > 0)
}

/// Highest current frequency across frequency domains, in kHz.
///
/// Falls back to per-CPU `cpufreq` directories; 0 when nothing is readable.
pub fn max_current_freq_khz<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> i64 {
    let from_policies = policies(fs, sys_root)
        .iter()
        .filter_map(|dir| current_freq(fs, dir))
        .max();
    if let Some(freq) = from_policies {
        return freq;
    }

    let base = cpu_dir(sys_root);
    numbered_cpus(fs, sys_root)
        .iter()
        .filter_map(|name| current_freq(fs, &base.join(name).join("cpufreq")))
        .max()
        .unwrap_or(0)
}

/// A group of CPUs sharing one frequency policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuCluster {
    pub cpus: BTreeSet<u32>,
    pub max_freq_khz: i64,
}

/// Discovers clusters from distinct `related_cpus` sets, fastest first.
pub fn clusters<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Vec<CpuCluster> {
    let mut seen = HashSet::new();
    let mut clusters = Vec::new();

    for dir in policies(fs, sys_root) {
        let Some(related) = fs.read_first_line(&dir.join("related_cpus")) else {
            continue;
        };
        if !seen.insert(related.clone()) {
            continue;
        }
        let max_freq_khz = fs
            .read_int(&dir.join("cpuinfo_max_freq"))
            .filter(|&f| f > 0)
            .or_else(|| fs.read_int(&dir.join("scaling_max_freq")))
            .unwrap_or(0);
        clusters.push(CpuCluster {
            cpus: parse_cpu_list(&related),
            max_freq_khz,
        });
    }

    clusters.sort_by(|a, b| b.max_freq_khz.cmp(&a.max_freq_khz));
    clusters
}

/// Core counts per cluster joined by `+`, e.g. `1+3+4`.
pub fn core_layout(clusters: &[CpuCluster]) -> String {
    clusters
        .iter()
        .map(|c| c.cpus.len().to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Core counts labelled performance or efficiency, e.g. `1P + 3P + 4E`.
///
/// A single cluster is all performance; otherwise the two fastest clusters
/// are performance when there are three or more, else only the fastest.
pub fn core_layout_labeled(clusters: &[CpuCluster]) -> String {
    let performance = match clusters.len() {
        0 | 1 => clusters.len(),
        2 => 1,
        _ => 2,
    };
    clusters
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}{}", c.cpus.len(), if i < performance { "P" } else { "E" }))
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Best-effort CPU or SoC name.
///
/// Tries `devices/soc0/machine`, then the `/proc/cpuinfo` hardware or model
/// line, then gives up with `Unknown`.
pub fn cpu_name<F: FileSystem + ?Sized>(fs: &F, proc_root: &Path, sys_root: &Path) -> String {
    if let Some(machine) = fs.read_first_line(&sys_root.join("devices/soc0/machine")) {
        return machine;
    }
    fs.read_to_string(&proc_root.join("cpuinfo"))
        .ok()
        .and_then(|content| parse_cpuinfo_name(&content))
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const SYS: &str = "/sys";

    #[test]
    fn test_typical_device_topology() {
        let fs = MockFs::typical_device();
        let sys = Path::new(SYS);
        assert_eq!(logical_cores(&fs, sys), 8);
        assert_eq!(physical_cores(&fs, sys, 8), 8);
        assert_eq!(max_current_freq_khz(&fs, sys), 2_995_200);

        let clusters = clusters(&fs, sys);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].max_freq_khz, 3_000_000);
        assert_eq!(core_layout(&clusters), "1+3+4");
        assert_eq!(core_layout_labeled(&clusters), "1P + 3P + 4E");
        assert_eq!(cpu_name(&fs, Path::new("/proc"), sys), "SM8550");
    }

    #[test]
    fn test_logical_cores_fallback_to_scan() {
        let fs = MockFs::new();
        for name in ["cpu0", "cpu1", "cpu2", "cpufreq", "cpuidle"] {
            fs.add_dir(format!("/sys/devices/system/cpu/{}", name));
        }
        assert_eq!(logical_cores(&fs, Path::new(SYS)), 3);
        assert_eq!(logical_cores(&MockFs::new(), Path::new(SYS)), 0);
    }

    #[test]
    fn test_physical_cores_with_smt() {
        let fs = MockFs::new();
        fs.add_file("/sys/devices/system/cpu/smt/active", "1\n");
        for (cpu, core) in [(0, 0), (1, 1), (2, 0), (3, 1)] {
            let topo = format!("/sys/devices/system/cpu/cpu{}/topology", cpu);
            fs.add_file(format!("{}/physical_package_id", topo), "0\n");
            fs.add_file(format!("{}/core_id", topo), format!("{}\n", core));
        }
        assert_eq!(physical_cores(&fs, Path::new(SYS), 4), 2);

        fs.add_file("/sys/devices/system/cpu/smt/active", "0\n");
        assert_eq!(physical_cores(&fs, Path::new(SYS), 4), 4);
    }

    #[test]
    fn test_freq_falls_back_to_per_cpu() {
        let fs = MockFs::new();
        fs.add_file("/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq", "0\n");
        fs.add_file("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_cur_freq", "1500000\n");
        fs.add_file("/sys/devices/system/cpu/cpu1/cpufreq/scaling_cur_freq", "1700000\n");
        assert_eq!(max_current_freq_khz(&fs, Path::new(SYS)), 1_700_000);
        assert_eq!(max_current_freq_khz(&MockFs::new(), Path::new(SYS)), 0);
    }

    #[test]
    fn test_layout_labels() {
        let cluster = |n: u32, f: i64| CpuCluster {
            cpus: (0..n).collect(),
            max_freq_khz: f,
        };
        assert_eq!(core_layout_labeled(&[cluster(8, 2_000_000)]), "8P");
        assert_eq!(
            core_layout_labeled(&[cluster(4, 2_400_000), cluster(4, 1_800_000)]),
            "4P + 4E"
        );
        assert_eq!(
            core_layout_labeled(&[
                cluster(1, 3_000_000),
                cluster(2, 2_800_000),
                cluster(2, 2_400_000),
                cluster(3, 2_000_000)
            ]),
            "1P + 2P + 2E + 3E"
        );
        assert_eq!(core_layout(&[]), "");
        assert_eq!(core_layout_labeled(&[]), "");
    }

    #[test]
    fn test_duplicate_policies_collapse() {
        let fs = MockFs::new();
        for policy in [0, 1] {
            let base = format!("/sys/devices/system/cpu/cpufreq/policy{}", policy);
            fs.add_file(format!("{}/related_cpus", base), "0-3\n");
            fs.add_file(format!("{}/cpuinfo_max_freq", base), "2000000\n");
        }
        let found = clusters(&fs, Path::new(SYS));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cpus.len(), 4);
    }

    #[test]
    fn test_cpu_name_fallbacks() {
        let fs = MockFs::new();
        fs.add_file("/proc/cpuinfo", "processor\t: 0\nmodel name\t: AMD Ryzen 7\n");
        assert_eq!(cpu_name(&fs, Path::new("/proc"), Path::new(SYS)), "AMD Ryzen 7");
        assert_eq!(cpu_name(&MockFs::new(), Path::new("/proc"), Path::new(SYS)), "Unknown");
    }
}
