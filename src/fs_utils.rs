//! Filesystem helpers for crash-safe output
//!
//! - `normalize_path`: Strips Windows `\\?\` prefix from canonicalized paths
//! - `atomic_rename`: Handles atomic file replacement (Windows requires explicit delete)
//! - `atomic_write`: Temp file + fsync + rename, so readers never see a partial file
//! - `BuildLock`: Advisory lock file held for the duration of a rebuild

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Result, StructError};

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// On Windows, `Path::canonicalize()` returns paths with the extended-length path prefix
/// (`\\?\C:\...`), which breaks string comparisons and user-facing display.
/// This function strips the prefix on Windows while being a no-op on Unix.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use codestruct::fs_utils::normalize_path;
///
/// let path = PathBuf::from("/home/user/repo");
/// assert_eq!(normalize_path(&path), path);
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Render a path relative to `root` with `/` separators.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Cross-platform atomic rename that handles Windows file replacement.
///
/// On Unix, `fs::rename` atomically replaces the target if it exists.
/// On Windows, `fs::rename` fails if the target exists, so the target is removed first.
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }
    }
    std::fs::rename(src, dst)
}

fn temp_path_for(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

/// Write `bytes` to `dst` through a temp file in the same directory.
///
/// `check` runs against the bytes as read back from the temp file; if it
/// fails, or any I/O step fails, the temp file is removed and `dst` is left
/// exactly as it was.
pub fn atomic_write_checked<F>(dst: &Path, bytes: &[u8], check: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> Result<()>,
{
    let tmp = temp_path_for(dst);
    let outcome = (|| {
        let mut file = File::create(&tmp).map_err(|e| StructError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StructError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StructError::io(&tmp, e))?;
        drop(file);

        let written = fs::read(&tmp).map_err(|e| StructError::io(&tmp, e))?;
        check(&written)?;

        atomic_rename(&tmp, dst).map_err(|e| StructError::io(dst, e))
    })();

    if outcome.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    outcome
}

/// Atomic write without a content check
pub fn atomic_write(dst: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write_checked(dst, bytes, |_| Ok(()))
}

/// Serialize `value` as pretty JSON (trailing newline) for on-disk documents
pub fn to_json_bytes<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| StructError::json(path, e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Atomically write a JSON document, verifying it parses back before commit
pub fn write_json_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write_checked(path, bytes, |written| {
        serde_json::from_slice::<serde_json::Value>(written)
            .map(|_| ())
            .map_err(|e| StructError::json(path, e))
    })
}

// ============================================================================
// Advisory build lock
// ============================================================================

/// Project-level lock held while a rebuild writes the structure directory.
///
/// The lock is a file created with `create_new`; it is removed on drop. A
/// lock file older than the configured staleness window is assumed to belong
/// to a crashed process and is taken over.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !Self::is_stale(path, stale_after) {
                    return Err(StructError::Locked {
                        path: path.to_path_buf(),
                    });
                }
                tracing::warn!("Taking over stale build lock at {}", path.display());
                fs::remove_file(path).map_err(|e| StructError::io(path, e))?;
                Self::try_create(path).map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => StructError::Locked {
                        path: path.to_path_buf(),
                    },
                    _ => StructError::io(path, e),
                })
            }
            Err(e) => Err(StructError::io(path, e)),
        }
    }

    fn try_create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writeln!(file, "pid={}\nacquired={}", std::process::id(), now)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age > stale_after)
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
