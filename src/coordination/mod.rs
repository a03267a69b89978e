//! Cross-process coordination: the advisory store lock and the shared-server
//! lifecycle guard.
//!
//! The physical store accepts one writer at a time. Everything with write
//! intent — interactive mutations, every dream-worker phase, shared-server
//! management — serializes behind [`lock::StoreLock`], a PID-file lock keyed
//! to the store location. The marker files managed by [`server_guard`] are
//! advisory and may be stale; every reader treats them that way.

pub mod lock;
pub mod server_guard;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Lock file guarding writes to the store at `db_path`.
pub fn store_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

/// Run `f` while holding the store write lock.
///
/// A lock-acquisition Conflict is retried once after a short backoff before
/// surfacing, per the write-contention policy.
pub fn with_store_lock<T>(
    lock_path: &Path,
    timeout: Duration,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let lock = lock::StoreLock::new(lock_path);
    let guard = match lock.acquire(timeout) {
        Ok(guard) => guard,
        Err(Error::Conflict(_)) => {
            std::thread::sleep(Duration::from_millis(250));
            lock.acquire(timeout)?
        }
        Err(e) => return Err(e),
    };
    let result = f();
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_is_keyed_to_store_location() {
        let path = store_lock_path(Path::new("/data/memory.db"));
        assert_eq!(path, PathBuf::from("/data/memory.db.lock"));
    }

    #[test]
    fn with_store_lock_runs_closure() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("memory.db.lock");
        let out =
            with_store_lock(&lock_path, Duration::from_secs(1), || Ok(42)).unwrap();
        assert_eq!(out, 42);
        // Guard released and file cleaned up
        assert!(!lock_path.exists());
    }

    #[test]
    fn with_store_lock_propagates_closure_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("memory.db.lock");
        let err = with_store_lock::<()>(&lock_path, Duration::from_secs(1), || {
            Err(Error::invalid("boom"))
        })
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        assert!(!lock_path.exists(), "lock released on failure too");
    }
}
