//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` and `/sys` states of a
//! handheld device with a big.LITTLE CPU and an integrated GPU.

use super::filesystem::MockFs;

impl MockFs {
    /// Creates a typical device.
    ///
    /// Includes: 8 CPUs in three frequency clusters, thermal zones for CPU,
    /// GPU and SoC sensors, `/data` mounted from `dm-5`, a Wi-Fi interface
    /// that is up, a kgsl GPU and two processes.
    pub fn typical_device() -> Self {
        let fs = Self::new();

        fs.add_file("/proc/uptime", "12345.67 98765.43\n");
        fs.add_file("/proc/sys/fs/file-nr", "4096\t0\t9223372036854775807\n");
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    3000000 kB
Buffers:          100000 kB
Cached:          2000000 kB
SwapCached:        10000 kB
SwapTotal:       4000000 kB
SwapFree:        3000000 kB
Compressed:       512000 kB
CommitLimit:     7000000 kB
Committed_AS:    9000000 kB
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            "\
processor\t: 0
BogoMIPS\t: 38.40
Features\t: fp asimd evtstrm aes pmull sha1 sha2 crc32
Hardware\t: Qualcomm Technologies, Inc SM8550
",
        );

        // Processes with their threads
        fs.add_dir("/proc/1/task/1");
        fs.add_dir("/proc/100/task/100");
        fs.add_dir("/proc/100/task/101");
        fs.add_dir("/proc/self");

        // CPU topology and frequency policies
        fs.add_file("/sys/devices/soc0/machine", "SM8550\n");
        fs.add_file("/sys/devices/system/cpu/online", "0-7\n");
        for cpu in 0..8 {
            fs.add_dir(format!("/sys/devices/system/cpu/cpu{}", cpu));
        }
        fs.add_dir("/sys/devices/system/cpu/cpufreq");
        fs.add_dir("/sys/devices/system/cpu/cpuidle");
        for (policy, related, max, cur) in [
            (0, "0 1 2 3", 1_800_000, 1_200_000),
            (4, "4 5 6", 2_400_000, 2_000_000),
            (7, "7", 3_000_000, 2_995_200),
        ] {
            let base = format!("/sys/devices/system/cpu/cpufreq/policy{}", policy);
            fs.add_file(format!("{}/related_cpus", base), format!("{}\n", related));
            fs.add_file(format!("{}/cpuinfo_max_freq", base), format!("{}\n", max));
            fs.add_file(format!("{}/scaling_cur_freq", base), format!("{}\n", cur));
        }

        // Thermal zones
        fs.add_thermal_zone(0, "cpu-0-0", 42000);
        fs.add_thermal_zone(1, "cpu-1-0", 45000);
        fs.add_thermal_zone(2, "cpu-1-1", 44000);
        fs.add_thermal_zone(3, "battery", 30000);
        fs.add_thermal_zone(4, "gpuss-0", 51000);
        fs.add_thermal_zone(5, "gpuss-1", 53000);
        fs.add_thermal_zone(6, "socd", 48000);
        fs.add_thermal_zone(7, "cpu-0-hw-trip", 95000);
        fs.add_dir("/sys/class/hwmon");

        // Storage
        fs.add_file(
            "/proc/mounts",
            "\
/dev/block/dm-5 /data ext4 rw,seclabel,nosuid,nodev,noatime 0 0
/dev/block/sda4 /metadata ext4 rw,seclabel 0 0
tmpfs /dev tmpfs rw,seclabel,nosuid,relatime 0 0
",
        );
        fs.set_fs_usage("/data", 128_000_000_000, 64_000_000_000);
        fs.set_block_stat("dm-5", 1000, 1000, 500, 400, 2000, 700, 800);
        fs.add_file("/sys/block/dm-5/queue/logical_block_size", "512\n");

        // Network
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     1000    0    0    0     0          0         0   123456     1000    0    0    0     0       0          0
rmnet_data0: 5000000     4000    0    0    0     0          0         0  1000000     3000    0    0    0     0       0          0
 wlan0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
",
        );
        fs.add_file("/sys/class/net/lo/operstate", "unknown\n");
        fs.add_file("/sys/class/net/rmnet_data0/operstate", "down\n");
        fs.add_file("/sys/class/net/wlan0/operstate", "up\n");

        // GPU
        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpu_model", "Adreno740v2\n");
        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpu_busy_percentage", "37 %\n");
        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpubusy", "  1000  5000\n");

        fs
    }
}
