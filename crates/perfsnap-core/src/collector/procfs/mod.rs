//! `/proc` counter parsing and task counting.

pub mod parser;

use std::path::Path;

pub use parser::ParseError;

use crate::collector::traits::FileSystem;

fn is_numeric(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Counts processes (`/proc/<pid>`) and threads (`/proc/<pid>/task/<tid>`).
///
/// Processes that exit during the scan simply contribute no threads.
pub fn count_tasks<F: FileSystem + ?Sized>(fs: &F, proc_root: &Path) -> (i32, i64) {
    let mut processes = 0;
    let mut threads = 0;
    for pid in fs.entry_names(proc_root) {
        if !is_numeric(&pid) {
            continue;
        }
        processes += 1;
        threads += fs
            .entry_names(&proc_root.join(&pid).join("task"))
            .iter()
            .filter(|tid| is_numeric(tid))
            .count() as i64;
    }
    (processes, threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_count_tasks() {
        let fs = MockFs::typical_device();
        assert_eq!(count_tasks(&fs, Path::new("/proc")), (2, 3));
        assert_eq!(count_tasks(&MockFs::new(), Path::new("/proc")), (0, 0));
    }
}
