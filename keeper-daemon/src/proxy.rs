//! Typed remote handle to a running daemon.
//!
//! Every call may block on IPC latency and fails with a connection-loss
//! error ([`ProxyError::is_connection_loss`]) once the daemon has exited.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use keeper_core::{DaemonError, SyncStatus, UpdateInfo};

use crate::error::ProxyError;
use crate::protocol::{send_request, DaemonRequest};

/// The RPC surface the supervisor consumes.
pub trait DaemonProxy: Send + Sync {
    fn ping(&self) -> Result<(), ProxyError>;
    fn get_config(&self, section: &str, key: &str) -> Result<Value, ProxyError>;
    fn set_config(&self, section: &str, key: &str, value: Value) -> Result<(), ProxyError>;
    fn status(&self) -> Result<SyncStatus, ProxyError>;
    fn paused(&self) -> Result<bool, ProxyError>;
    fn pending_errors(&self) -> Result<Vec<DaemonError>, ProxyError>;
    fn clear_errors(&self) -> Result<(), ProxyError>;
    fn start_sync(&self) -> Result<(), ProxyError>;
    fn pause_sync(&self) -> Result<(), ProxyError>;
    fn resume_sync(&self) -> Result<(), ProxyError>;
    fn stop_sync(&self) -> Result<(), ProxyError>;
    fn rebuild_index(&self) -> Result<(), ProxyError>;
    fn dropbox_path(&self) -> Result<PathBuf, ProxyError>;
    fn to_local_path(&self, remote_path: &str) -> Result<PathBuf, ProxyError>;
    fn check_for_updates(&self) -> Result<UpdateInfo, ProxyError>;

    /// Drop the connection; later calls fail. No-op by default.
    fn release(&self) {}
}

/// [`DaemonProxy`] over the daemon's Unix socket, one connection per call.
#[derive(Debug)]
pub struct SocketProxy {
    socket: PathBuf,
    released: AtomicBool,
}

impl SocketProxy {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            released: AtomicBool::new(false),
        }
    }

    pub fn socket(&self) -> &std::path::Path {
        &self.socket
    }

    fn call(&self, request: DaemonRequest) -> Result<Value, ProxyError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ProxyError::ChannelClosed("proxy released"));
        }
        send_request(&self.socket, &request)?.into_data()
    }

    fn call_as<T: DeserializeOwned>(&self, request: DaemonRequest) -> Result<T, ProxyError> {
        Ok(serde_json::from_value(self.call(request)?)?)
    }

    fn call_unit(&self, request: DaemonRequest) -> Result<(), ProxyError> {
        self.call(request).map(|_| ())
    }
}

impl DaemonProxy for SocketProxy {
    fn ping(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::Ping)
    }

    fn get_config(&self, section: &str, key: &str) -> Result<Value, ProxyError> {
        self.call(DaemonRequest::GetConfig {
            section: section.to_owned(),
            key: key.to_owned(),
        })
    }

    fn set_config(&self, section: &str, key: &str, value: Value) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::SetConfig {
            section: section.to_owned(),
            key: key.to_owned(),
            value,
        })
    }

    fn status(&self) -> Result<SyncStatus, ProxyError> {
        self.call_as(DaemonRequest::Status)
    }

    fn paused(&self) -> Result<bool, ProxyError> {
        self.call_as(DaemonRequest::Paused)
    }

    fn pending_errors(&self) -> Result<Vec<DaemonError>, ProxyError> {
        self.call_as(DaemonRequest::PendingErrors)
    }

    fn clear_errors(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::ClearErrors)
    }

    fn start_sync(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::StartSync)
    }

    fn pause_sync(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::PauseSync)
    }

    fn resume_sync(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::ResumeSync)
    }

    fn stop_sync(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::StopSync)
    }

    fn rebuild_index(&self) -> Result<(), ProxyError> {
        self.call_unit(DaemonRequest::RebuildIndex)
    }

    fn dropbox_path(&self) -> Result<PathBuf, ProxyError> {
        self.call_as(DaemonRequest::DropboxPath)
    }

    fn to_local_path(&self, remote_path: &str) -> Result<PathBuf, ProxyError> {
        self.call_as(DaemonRequest::ToLocalPath {
            path: remote_path.to_owned(),
        })
    }

    fn check_for_updates(&self) -> Result<UpdateInfo, ProxyError> {
        self.call_as(DaemonRequest::CheckForUpdates)
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Ask the daemon behind `socket` to exit. Used by `terminate_process` and the CLI.
pub fn request_shutdown(socket: &std::path::Path) -> Result<(), ProxyError> {
    send_request(socket, &DaemonRequest::Shutdown)?
        .into_data()
        .map(|_| ())
}

/// Queue an error on the daemon behind `socket`, as the sync engine would.
pub fn report_error(socket: &std::path::Path, error: DaemonError) -> Result<(), ProxyError> {
    send_request(socket, &DaemonRequest::ReportError { error })?
        .into_data()
        .map(|_| ())
}

/// Payload for a `ping` reply.
pub(crate) fn pong(pid: u32) -> Value {
    json!({ "pong": true, "pid": pid })
}
