//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait is the only way the sampling engine touches
//! `/proc` and `/sys`. Production code uses `RealFs`; tests use `MockFs`.

use std::io;
use std::path::{Path, PathBuf};

/// Space accounting of a mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    pub total_bytes: i64,
    pub available_bytes: i64,
}

impl FsUsage {
    /// Bytes not available to unprivileged users.
    pub fn used_bytes(&self) -> i64 {
        (self.total_bytes - self.available_bytes).max(0)
    }
}

/// Abstraction for filesystem operations.
///
/// Reads are best-effort and never retried; a failed read is reported to
/// the caller, which decides how to degrade.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory as full paths.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns size and free space of the filesystem mounted at `path`.
    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage>;

    /// Reads the first line of a file, trimmed.
    ///
    /// Returns `None` when the file is missing, unreadable, or the line is empty.
    fn read_first_line(&self, path: &Path) -> Option<String> {
        let content = self.read_to_string(path).ok()?;
        let line = content.lines().next()?.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    /// Parses the first whitespace-separated integer token of a file.
    fn read_int(&self, path: &Path) -> Option<i64> {
        self.read_to_string(path)
            .ok()?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }

    /// Lists the file names of a directory's entries, sorted.
    ///
    /// An unreadable directory yields an empty list.
    fn entry_names(&self, path: &Path) -> Vec<String> {
        let mut names: Vec<String> = self
            .read_dir(path)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string and stat is a
        // properly sized, writable statvfs struct.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let block_size = stat.f_frsize as i64;
        Ok(FsUsage {
            total_bytes: stat.f_blocks as i64 * block_size,
            available_bytes: stat.f_bavail as i64 * block_size,
        })
    }

    #[cfg(not(unix))]
    fn fs_usage(&self, _path: &Path) -> io::Result<FsUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statvfs is not available on this platform",
        ))
    }
}
