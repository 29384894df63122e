//! Advisory lock files for keyring mutation
//!
//! The lock is a separate file created exclusively next to the keyring
//! file. Writers from other processes honor it; readers never take it.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::{KeyringError, Result};

/// Creation attempts before the lock is declared stale
pub const MAX_LOCK_ATTEMPTS: u32 = 32;

/// Pause after each failed attempt
pub const LOCK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// A held lock; dropping it deletes the lock file
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

/// Take the lock at `path`, waiting out a live holder
pub(crate) fn acquire(path: &Path) -> Result<LockGuard> {
    acquire_with(path, MAX_LOCK_ATTEMPTS, LOCK_RETRY_DELAY)
}

fn acquire_with(path: &Path, attempts: u32, delay: Duration) -> Result<LockGuard> {
    for _ in 0..attempts {
        match try_create(path) {
            Ok(()) => {
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => thread::sleep(delay),
            Err(e) => {
                return Err(KeyringError::LockFailed(format!(
                    "creating {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    // The holder is presumed dead; take the lock over.
    warn!(
        "keyring lock {} stuck after {} attempts, assuming stale and stealing it",
        path.display(),
        attempts
    );
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            return Err(KeyringError::LockFailed(format!(
                "deleting stale {}: {}",
                path.display(),
                e
            )));
        }
    }
    try_create(path).map_err(|e| {
        KeyringError::LockFailed(format!("recreating {}: {}", path.display(), e))
    })?;
    Ok(LockGuard {
        path: path.to_path_buf(),
    })
}

fn try_create(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Unlock failure is logged, never fatal: the next writer will
        // wait it out and steal.
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                "failed to delete keyring lock {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
