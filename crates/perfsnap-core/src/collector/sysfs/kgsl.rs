//! Adreno GPU counters under `class/kgsl/kgsl-3d0`.

use std::path::{Path, PathBuf};

use crate::collector::procfs::parser::parse_gpubusy;
use crate::collector::traits::FileSystem;

fn kgsl_dir(sys_root: &Path) -> PathBuf {
    sys_root.join("class/kgsl/kgsl-3d0")
}

/// GPU model string, e.g. `Adreno740v2`.
pub fn gpu_model<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Option<String> {
    fs.read_first_line(&kgsl_dir(sys_root).join("gpu_model"))
}

/// Driver-computed utilization. Values outside 0–100 are rejected.
pub fn busy_percentage<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Option<f64> {
    let value = fs.read_int(&kgsl_dir(sys_root).join("gpu_busy_percentage"))?;
    (0..=100).contains(&value).then_some(value as f64)
}

/// Cumulative `(busy, total)` cycle counters.
pub fn busy_counters<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Option<(i64, i64)> {
    let content = fs.read_to_string(&kgsl_dir(sys_root).join("gpubusy")).ok()?;
    parse_gpubusy(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_kgsl_reads() {
        let fs = MockFs::typical_device();
        let sys = Path::new("/sys");
        assert_eq!(gpu_model(&fs, sys).as_deref(), Some("Adreno740v2"));
        assert_eq!(busy_percentage(&fs, sys), Some(37.0));
        assert_eq!(busy_counters(&fs, sys), Some((1000, 5000)));
    }

    #[test]
    fn test_busy_percentage_out_of_range() {
        let fs = MockFs::new();
        fs.add_file("/sys/class/kgsl/kgsl-3d0/gpu_busy_percentage", "101 %\n");
        assert_eq!(busy_percentage(&fs, Path::new("/sys")), None);
        assert_eq!(busy_counters(&fs, Path::new("/sys")), None);
        assert_eq!(gpu_model(&fs, Path::new("/sys")), None);
    }
}
