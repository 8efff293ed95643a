//! Run-level lock preventing overlapping syncs against the same store.
//!
//! The lock is a file created exclusively in the storage directory. Its
//! content identifies the owner so that a guard never removes a lock that
//! was taken over after being considered stale.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::error::{AppError, Result};

/// Lock guard that releases the lock file when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    owner: String,
    acquired_at: Instant,
}

impl RunLock {
    /// Acquire the lock at `path`.
    ///
    /// A lock file older than `stale_after` is treated as abandoned and
    /// replaced; any other existing lock fails with `RunInProgress`.
    pub fn acquire(path: impl AsRef<Path>, stale_after: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let owner = format!(
            "pid={} at={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        match create_exclusive(&path, &owner) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(&path, stale_after) {
                    return Err(AppError::RunInProgress(path.display().to_string()));
                }
                log::warn!("Replacing stale run lock {}", path.display());
                fs::remove_file(&path).or_else(|e| match e.kind() {
                    ErrorKind::NotFound => Ok(()),
                    _ => Err(e),
                })?;
                // Another process may have won the race after the removal.
                create_exclusive(&path, &owner).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => AppError::RunInProgress(path.display().to_string()),
                    _ => AppError::Io(e),
                })?;
            }
            Err(e) => return Err(AppError::Io(e)),
        }

        log::debug!("Acquired run lock {}", path.display());
        Ok(Self {
            path,
            owner,
            acquired_at: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token written into the lock, unique to this acquisition.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Time elapsed since the lock was acquired.
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content == self.owner => {
                if let Err(e) = fs::remove_file(&self.path) {
                    log::warn!("Failed to release run lock {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => log::warn!(
                "Run lock {} was taken over; leaving it in place",
                self.path.display()
            ),
            Err(e) => log::warn!("Run lock {} unreadable: {}", self.path.display(), e),
        }
    }
}

fn create_exclusive(path: &Path, owner: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(owner.as_bytes())?;
    file.sync_all()
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}
