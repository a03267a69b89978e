//! Shared-server lifecycle: version-checked start, kill, and replace.
//!
//! A long-lived HTTP server process can hold the store connection on behalf
//! of several client sessions. Two marker files next to the store record
//! which version is running and under which PID; both are advisory and may
//! be stale after a crash or reboot. [`ensure_shared_server`] is the client
//! entry point: under the management lock it probes the port, compares the
//! recorded version against this binary, and kills/starts/rewrites as
//! needed — never releasing the lock between "kill" and "start", so no
//! second client can observe an unlocked-but-serverless gap and race a
//! duplicate old-version server into existence.

use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ReverieConfig;
use crate::coordination::lock::{process_alive, StoreLock};
use crate::error::{Error, Result};

/// How long a killed server gets to exit before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for a freshly started server to answer on its port.
const START_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of [`ensure_shared_server`].
#[derive(Debug, PartialEq, Eq, Serialize)]
pub enum ServerStatus {
    /// A matching-version server was already running.
    AlreadyRunning,
    /// No server was running; one was started.
    Started,
    /// A stale-version server was killed and replaced.
    Restarted,
}

pub fn server_version_file(data_dir: &Path) -> PathBuf {
    data_dir.join("server.version")
}

pub fn server_pid_file(data_dir: &Path) -> PathBuf {
    data_dir.join("server.pid")
}

pub fn server_lock_file(data_dir: &Path) -> PathBuf {
    data_dir.join("server.lock")
}

/// Read the recorded running-server version. None when missing/unreadable.
pub fn read_server_version(data_dir: &Path) -> Option<String> {
    std::fs::read_to_string(server_version_file(data_dir))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read the recorded running-server PID. None when missing/unparseable.
pub fn read_server_pid(data_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(server_pid_file(data_dir))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Record the running server's version and PID.
pub fn write_server_info(data_dir: &Path, pid: u32, version: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::Internal(format!("failed to create data dir: {e}")))?;
    std::fs::write(server_version_file(data_dir), version)
        .map_err(|e| Error::Internal(format!("failed to write version file: {e}")))?;
    std::fs::write(server_pid_file(data_dir), pid.to_string())
        .map_err(|e| Error::Internal(format!("failed to write pid file: {e}")))?;
    Ok(())
}

/// Best-effort removal of both marker files.
pub fn cleanup_server_files(data_dir: &Path) {
    for file in [server_version_file(data_dir), server_pid_file(data_dir)] {
        let _ = std::fs::remove_file(file);
    }
}

/// TCP probe: is anything listening on host:port?
pub fn is_server_running(host: &str, port: u16) -> bool {
    let addr: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    TcpStream::connect_timeout(&addr, Duration::from_secs(1)).is_ok()
}

/// Wait until the server answers on its port, bounded by `timeout`.
pub fn wait_for_server(host: &str, port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if is_server_running(host, port) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    false
}

/// Find the PID listening on a port via `lsof`. Fallback for when the PID
/// marker is stale or missing.
pub fn find_pid_on_port(port: u16) -> Option<u32> {
    let output = Command::new("lsof")
        .args(["-ti", &format!(":{port}")])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Verify a PID actually belongs to a reverie server before killing it.
/// Recorded PIDs can be recycled by the OS after a reboot.
fn is_reverie_process(pid: u32, port: u16) -> bool {
    if !process_alive(pid) {
        return false;
    }

    // Linux: /proc cmdline is authoritative
    if let Ok(cmdline) = std::fs::read_to_string(format!("/proc/{pid}/cmdline")) {
        if cmdline.to_lowercase().contains("reverie") {
            return true;
        }
    }

    // Portable fallback: ps, then a listening-port check
    if let Ok(output) = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
    {
        if output.status.success() {
            let cmdline = String::from_utf8_lossy(&output.stdout).to_lowercase();
            if cmdline.contains("reverie") {
                return true;
            }
        }
    }

    find_pid_on_port(port) == Some(pid)
}

/// Kill the recorded (or port-discovered) old server.
///
/// Returns Ok(true) when the server is gone afterwards — including the case
/// where nothing was running. Refuses to kill a PID it cannot attribute to
/// a reverie server, cleaning up the stale markers instead.
pub fn kill_old_server(data_dir: &Path, port: u16) -> Result<bool> {
    let (pid, from_marker) = match read_server_pid(data_dir) {
        Some(pid) => (pid, true),
        None => match find_pid_on_port(port) {
            Some(pid) => {
                tracing::info!(pid, port, "found listener on port (no PID marker)");
                (pid, false)
            }
            None => {
                tracing::debug!("no PID marker and nothing listening on port");
                return Ok(true);
            }
        },
    };

    if !is_reverie_process(pid, port) {
        if from_marker {
            tracing::warn!(pid, "PID marker does not point at a reverie server; clearing stale markers");
            cleanup_server_files(data_dir);
            return Ok(true);
        }
        tracing::warn!(pid, port, "listener on port is not a reverie server, refusing to kill");
        return Ok(false);
    }

    tracing::info!(pid, "terminating old server for version upgrade");
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }

    let deadline = Instant::now() + TERM_GRACE;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            cleanup_server_files(data_dir);
            tracing::info!("old server terminated");
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    tracing::warn!(pid, "old server ignored SIGTERM, force killing");
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
    std::thread::sleep(Duration::from_millis(250));
    cleanup_server_files(data_dir);
    Ok(true)
}

/// Start the shared server as a detached background process and record its
/// version/PID markers.
pub fn start_background_server(config: &ReverieConfig) -> Result<u32> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::Internal(format!("cannot resolve own binary: {e}")))?;

    let mut command = Command::new(exe);
    command
        .arg("serve-http")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Detach into its own process group so it survives the invoking session
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .map_err(|e| Error::Internal(format!("failed to spawn shared server: {e}")))?;

    let pid = child.id();
    write_server_info(&config.data_dir(), pid, env!("CARGO_PKG_VERSION"))?;
    tracing::info!(pid, version = env!("CARGO_PKG_VERSION"), "shared server spawned");
    Ok(pid)
}

/// Client connection entry point: make sure a current-version shared server
/// is running, replacing a stale one if needed.
///
/// The whole check-kill-start-record sequence holds the management lock.
pub fn ensure_shared_server(config: &ReverieConfig) -> Result<ServerStatus> {
    let data_dir = config.data_dir();
    let host = config.server.host.clone();
    let port = config.server.port;
    let lock = StoreLock::new(server_lock_file(&data_dir));

    let timeout = Duration::from_secs(config.coordination.server_lock_timeout_secs);
    let guard = match lock.acquire(timeout) {
        Ok(guard) => guard,
        Err(Error::Conflict(_)) => {
            // Another client is managing the server right now; wait for it
            tracing::info!("another session is managing the shared server, waiting");
            if wait_for_server(&host, port, Duration::from_secs(20)) {
                return Ok(ServerStatus::AlreadyRunning);
            }
            return Err(Error::Conflict(
                "shared server not available after waiting for another session".into(),
            ));
        }
        Err(e) => return Err(e),
    };

    let status = if !is_server_running(&host, port) {
        tracing::info!(host = %host, port, "no shared server running, starting one");
        start_background_server(config)?;
        if !wait_for_server(&host, port, START_TIMEOUT) {
            return Err(Error::Unavailable(
                "shared server did not become ready in time".into(),
            ));
        }
        ServerStatus::Started
    } else {
        match read_server_version(&data_dir) {
            Some(version) if version == env!("CARGO_PKG_VERSION") => {
                tracing::info!(%version, "shared server version matches");
                ServerStatus::AlreadyRunning
            }
            recorded => {
                tracing::info!(
                    recorded = recorded.as_deref().unwrap_or("<missing>"),
                    client = env!("CARGO_PKG_VERSION"),
                    "shared server version mismatch, restarting"
                );
                if !kill_old_server(&data_dir, port)? {
                    return Err(Error::Conflict(format!(
                        "port {port} is held by a non-reverie process"
                    )));
                }

                // Wait for the port to be fully released
                let deadline = Instant::now() + TERM_GRACE;
                while Instant::now() < deadline && is_server_running(&host, port) {
                    std::thread::sleep(Duration::from_millis(250));
                }

                // Start the replacement before anyone else can observe the gap;
                // the management lock is still held here.
                start_background_server(config)?;
                if !wait_for_server(&host, port, START_TIMEOUT) {
                    return Err(Error::Unavailable(
                        "replacement server did not become ready in time".into(),
                    ));
                }
                ServerStatus::Restarted
            }
        }
    };

    drop(guard);
    Ok(status)
}
