//! Detached dream-worker process management.
//!
//! The consolidation job must survive the invoking session exiting, so it
//! runs as its own OS process in its own process group, stdio detached.
//! The invoker gets an immediate acknowledgment; completion is observable
//! only through the worker's log file and the store's state.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::ReverieConfig;
use crate::coordination::lock::StoreLock;
use crate::error::{Error, Result};

/// Spawn `reverie dream` detached from this process.
///
/// Returns the child PID without waiting. With `log_file` set the worker
/// appends its tracing output there; otherwise output is discarded.
pub fn spawn_detached_dreamer(log_file: Option<&Path>) -> Result<u32> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::Internal(format!("cannot resolve own binary: {e}")))?;

    let mut command = Command::new(exe);
    command.arg("dream").stdin(Stdio::null());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Internal(format!("cannot create log dir: {e}")))?;
            }
            let open = || {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| Error::Internal(format!("cannot open log file: {e}")))
            };
            command.stdout(open()?).stderr(open()?);
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    // New process group: the worker outlives the invoking session
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .map_err(|e| Error::Internal(format!("failed to spawn dream worker: {e}")))?;

    tracing::info!(pid = child.id(), "dream worker spawned");
    Ok(child.id())
}

/// Whether a dream worker currently holds the worker lock.
pub fn is_dreamer_running(config: &ReverieConfig) -> bool {
    let lock_path = super::DreamWorker::dream_lock_path(config);
    StoreLock::new(lock_path).held_by_live_process()
}

/// Default worker log location: `<data_dir>/logs/dream.log`.
pub fn default_log_path(config: &ReverieConfig) -> PathBuf {
    config.data_dir().join("logs").join("dream.log")
}
