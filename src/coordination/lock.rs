//! Advisory cross-process lock, keyed to a filesystem path.
//!
//! Implemented as a PID file created with `O_EXCL`: whoever creates the file
//! holds the lock, and the recorded PID lets a later process detect and
//! break a lock left behind by a crashed holder. Cooperative only — nothing
//! stops a process that ignores the protocol, which is exactly the advisory
//! contract the store layer expects.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Poll interval while waiting for a held lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct StoreLock {
    path: PathBuf,
}

/// Held lock. Dropping it removes the lock file.
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to remove lock file: {e}");
        }
    }
}

impl StoreLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Single acquisition attempt. `Ok(None)` means another live process
    /// holds the lock.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("failed to create lock dir: {e}")))?;
        }

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Some(LockGuard {
                    path: self.path.clone(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.holder_is_stale() {
                    tracing::warn!(path = %self.path.display(), "breaking stale lock");
                    let _ = std::fs::remove_file(&self.path);
                    // Re-attempt once; a racing process may have won
                    return match std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&self.path)
                    {
                        Ok(mut file) => {
                            let _ = write!(file, "{}", std::process::id());
                            Ok(Some(LockGuard {
                                path: self.path.clone(),
                            }))
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
                        Err(e) => Err(Error::Internal(format!("lock create failed: {e}"))),
                    };
                }
                Ok(None)
            }
            Err(e) => Err(Error::Internal(format!("lock create failed: {e}"))),
        }
    }

    /// Acquire with a bounded wait. Fails with Conflict rather than blocking
    /// forever.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(Error::Conflict(format!(
                    "lock timeout after {timeout:?}: {} is held by another process",
                    self.path.display()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Whether the lock file records a dead or unreadable holder.
    fn holder_is_stale(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) => !process_alive(pid),
                // Unreadable PID: treat as stale rather than deadlock forever
                Err(_) => true,
            },
            // Racing holder may have released between exists-check and read
            Err(_) => true,
        }
    }

    /// Whether the holder of this lock (if any) is a live process.
    pub fn held_by_live_process(&self) -> bool {
        self.path.exists() && !self.holder_is_stale()
    }
}

/// Check process liveness by sending signal 0.
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}
