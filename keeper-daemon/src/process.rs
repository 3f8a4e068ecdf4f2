//! Process registry: find, launch and terminate the daemon for an identity.
//!
//! A daemon is "found" when its socket answers `ping`; the pid comes from the
//! reply. Stale socket and pid files left behind by a crashed daemon are
//! removed during lookup.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use keeper_core::DaemonIdentity;

use crate::error::{io_err, ProxyError};
use crate::paths::{logs_dir, pid_path, socket_path, stderr_log_path, READY_LINE};
use crate::protocol::{send_request, DaemonRequest};
use crate::proxy::{request_shutdown, DaemonProxy, SocketProxy};

/// Env var overriding the daemon executable.
pub const DAEMON_BINARY_ENV: &str = "KEEPER_DAEMON_BINARY";

const CONNECT_ATTEMPTS: usize = 150;
const CONNECT_BACKOFF: Duration = Duration::from_millis(20);
const EXIT_TIMEOUT: Duration = Duration::from_secs(2);
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Host-level lookup of daemon processes keyed by identity.
pub trait ProcessRegistry: Send + Sync {
    /// Pid of the live daemon for `identity`, if any.
    fn find_process(&self, identity: &DaemonIdentity) -> Result<Option<u32>, ProxyError>;

    /// Start a daemon for `identity` and return once it answers on its socket.
    fn launch_process(&self, identity: &DaemonIdentity) -> Result<(), ProxyError>;

    /// Ask the daemon to exit; force-kill it if it does not.
    fn terminate_process(&self, identity: &DaemonIdentity) -> Result<(), ProxyError>;

    /// Connect a proxy to the running daemon for `identity`.
    fn connect(&self, identity: &DaemonIdentity) -> Result<Arc<dyn DaemonProxy>, ProxyError>;
}

/// [`ProcessRegistry`] backed by the socket and pid files under `~/.keeper/<identity>/`.
#[derive(Debug)]
pub struct PidFileRegistry {
    home: PathBuf,
    binary: Option<PathBuf>,
    ready_timeout: Duration,
    children: Mutex<HashMap<DaemonIdentity, Child>>,
}

impl PidFileRegistry {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            binary: None,
            ready_timeout: READY_TIMEOUT,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Launch `binary` instead of the current executable.
    pub fn with_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.binary = binary;
        self
    }

    /// How long a launched daemon may take to print its READY line.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn daemon_binary(&self) -> Result<PathBuf, ProxyError> {
        if let Ok(path) = std::env::var(DAEMON_BINARY_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        std::env::current_exe().map_err(|e| io_err("current_exe", e))
    }

    fn reap_child(&self, identity: &DaemonIdentity, wait: bool) {
        let Ok(mut children) = self.children.lock() else {
            return;
        };
        let Some(child) = children.get_mut(identity) else {
            return;
        };
        let finished = if wait {
            child.wait().is_ok()
        } else {
            matches!(child.try_wait(), Ok(Some(_)))
        };
        if finished {
            children.remove(identity);
        }
    }
}

impl ProcessRegistry for PidFileRegistry {
    fn find_process(&self, identity: &DaemonIdentity) -> Result<Option<u32>, ProxyError> {
        self.reap_child(identity, false);
        detect_daemon(&self.home, identity)
    }

    fn launch_process(&self, identity: &DaemonIdentity) -> Result<(), ProxyError> {
        if let Some(pid) = self.find_process(identity)? {
            tracing::debug!(identity = %identity, pid, "daemon already running, skipping launch");
            return Ok(());
        }

        let logs = logs_dir(&self.home, identity);
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
        let err_log = stderr_log_path(&self.home, identity);
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&err_log)
            .map_err(|e| io_err(&err_log, e))?;

        let binary = self.daemon_binary()?;
        tracing::info!(identity = %identity, binary = %binary.display(), "launching daemon");
        let mut child = Command::new(&binary)
            .args(["daemon", "start", "--config-name", identity.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| {
                ProxyError::Launch(format!("failed to start {}: {e}", binary.display()))
            })?;

        if let Some(stdout) = child.stdout.take() {
            if let ReadyWait::TimedOut = wait_for_ready(stdout, self.ready_timeout) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProxyError::Launch(format!(
                    "daemon did not report ready within {:?}; see {}",
                    self.ready_timeout,
                    err_log.display()
                )));
            }
        }

        for _ in 0..CONNECT_ATTEMPTS {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ProxyError::Launch(format!(
                    "daemon exited with {status}; see {}",
                    err_log.display()
                )));
            }
            if detect_daemon(&self.home, identity)?.is_some() {
                if let Ok(mut children) = self.children.lock() {
                    children.insert(identity.clone(), child);
                }
                return Ok(());
            }
            std::thread::sleep(CONNECT_BACKOFF);
        }

        let _ = child.kill();
        let _ = child.wait();
        Err(ProxyError::Launch(
            "daemon did not accept connections after launch".into(),
        ))
    }

    fn terminate_process(&self, identity: &DaemonIdentity) -> Result<(), ProxyError> {
        let socket = socket_path(&self.home, identity);
        let pid = read_pid_file(&pid_path(&self.home, identity));

        match request_shutdown(&socket) {
            Ok(()) => {
                if let Some(pid) = pid {
                    wait_for_process_exit(pid, EXIT_TIMEOUT);
                }
            }
            Err(err) => {
                tracing::warn!(identity = %identity, error = %err, "graceful daemon shutdown failed");
                // In-process hosts share our pid.
                if let Some(pid) = pid.filter(|pid| *pid != std::process::id()) {
                    let _ = Command::new("kill").arg("-9").arg(pid.to_string()).output();
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        self.reap_child(identity, true);
        cleanup_stale_files(&self.home, identity);
        Ok(())
    }

    fn connect(&self, identity: &DaemonIdentity) -> Result<Arc<dyn DaemonProxy>, ProxyError> {
        let proxy = SocketProxy::new(socket_path(&self.home, identity));
        proxy.ping()?;
        Ok(Arc::new(proxy))
    }
}

enum ReadyWait {
    Ready,
    /// stdout closed without a READY line; the exit is picked up by the socket poll.
    Closed,
    TimedOut,
}

/// Read `stdout` on a helper thread until the READY line, bounded by `timeout`.
fn wait_for_ready(stdout: impl Read + Send + 'static, timeout: Duration) -> ReadyWait {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) if line.trim() == READY_LINE => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    });

    match rx.recv_timeout(timeout) {
        Ok(()) => ReadyWait::Ready,
        Err(mpsc::RecvTimeoutError::Disconnected) => ReadyWait::Closed,
        Err(mpsc::RecvTimeoutError::Timeout) => ReadyWait::TimedOut,
    }
}

/// Ping the daemon socket for `identity`; clean up stale files when nothing answers.
fn detect_daemon(home: &Path, identity: &DaemonIdentity) -> Result<Option<u32>, ProxyError> {
    let socket = socket_path(home, identity);
    if !socket.exists() {
        let pid_file = pid_path(home, identity);
        if pid_file.exists() {
            let _ = fs::remove_file(&pid_file);
        }
        return Ok(None);
    }

    match send_request(&socket, &DaemonRequest::Ping) {
        Ok(response) if response.ok => {
            let pid = response
                .data
                .as_ref()
                .and_then(|data| data.get("pid"))
                .and_then(|pid| pid.as_u64())
                .and_then(|pid| u32::try_from(pid).ok())
                .or_else(|| read_pid_file(&pid_path(home, identity)));
            Ok(pid)
        }
        Ok(_) | Err(_) => {
            tracing::debug!(socket = %socket.display(), "removing stale daemon files");
            cleanup_stale_files(home, identity);
            Ok(None)
        }
    }
}

fn cleanup_stale_files(home: &Path, identity: &DaemonIdentity) {
    let _ = fs::remove_file(socket_path(home, identity));
    let _ = fs::remove_file(pid_path(home, identity));
}

fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn wait_for_process_exit(pid: u32, timeout: Duration) {
    if pid == std::process::id() {
        return;
    }
    let start = Instant::now();
    while start.elapsed() < timeout {
        match Command::new("kill").arg("-0").arg(pid.to_string()).output() {
            Ok(output) if !output.status.success() => return,
            Err(_) => return,
            _ => {}
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
