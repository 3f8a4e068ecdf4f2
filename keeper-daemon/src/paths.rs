//! Runtime file locations for one daemon identity, all under
//! `~/.keeper/<identity>/` (see `keeper_core::config`).

use std::path::{Path, PathBuf};

use keeper_core::config::identity_dir_at;
use keeper_core::DaemonIdentity;

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const DAEMON_PID: &str = "daemon.pid";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

/// Line printed on stdout once the daemon socket accepts connections.
pub const READY_LINE: &str = "READY";

pub fn daemon_dir(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    identity_dir_at(home, identity)
}

pub fn socket_path(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    daemon_dir(home, identity).join(DAEMON_SOCKET)
}

pub fn pid_path(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    daemon_dir(home, identity).join(DAEMON_PID)
}

pub fn logs_dir(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    daemon_dir(home, identity).join("logs")
}

pub fn stderr_log_path(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    logs_dir(home, identity).join(DAEMON_STDERR_LOG)
}
