//! In-memory mock filesystem for testing collectors without real `/proc` and `/sys`.
//!
//! Clones of a `MockFs` share the same tree, so a test can hand one clone to
//! a `MetricsContext` and keep rewriting counter files through another.

use crate::collector::traits::{FileSystem, FsUsage};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct MockTree {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Filesystem usage per mount point.
    mounts: HashMap<PathBuf, FsUsage>,
}

impl MockTree {
    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    tree: Arc<RwLock<MockTree>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        tree.add_parents(&path);
        tree.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        tree.add_parents(&path);
        tree.directories.insert(path);
    }

    /// Removes a file. Directories are left in place.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        tree.files.remove(path.as_ref());
    }

    /// Registers filesystem usage for a mount point.
    pub fn set_fs_usage(&self, mount_point: impl AsRef<Path>, total_bytes: i64, available_bytes: i64) {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        tree.mounts.insert(
            mount_point.as_ref().to_path_buf(),
            FsUsage {
                total_bytes,
                available_bytes,
            },
        );
    }

    /// Adds `/sys/class/thermal/thermal_zone<index>` with its `type` and `temp` files.
    pub fn add_thermal_zone(&self, index: u32, kind: &str, raw_temp: i64) {
        let base = PathBuf::from(format!("/sys/class/thermal/thermal_zone{}", index));
        self.add_file(base.join("type"), format!("{}\n", kind));
        self.add_file(base.join("temp"), format!("{}\n", raw_temp));
    }

    /// Writes `/sys/block/<device>/stat` with the given counters.
    ///
    /// Only the fields the sampler uses are parameters; the rest are zero.
    #[allow(clippy::too_many_arguments)]
    pub fn set_block_stat(
        &self,
        device: &str,
        reads: i64,
        sectors_read: i64,
        read_ticks: i64,
        writes: i64,
        sectors_written: i64,
        write_ticks: i64,
        io_ticks: i64,
    ) {
        self.add_file(
            format!("/sys/block/{}/stat", device),
            format!(
                "{:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
                reads, 0, sectors_read, read_ticks, writes, 0, sectors_written, write_ticks, 0,
                io_ticks, 0
            ),
        );
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.files.contains_key(path) || tree.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        if !tree.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in tree.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &tree.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        tree.mounts.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no filesystem mounted at {:?}", path),
            )
        })
    }
}
