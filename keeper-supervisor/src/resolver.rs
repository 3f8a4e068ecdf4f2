//! Daemon handle resolution: find or launch the daemon for an identity and
//! hold the one connection the rest of the supervisor talks through.

use std::path::Path;
use std::sync::Arc;

use keeper_core::{ConnectionState, DaemonIdentity, LaunchMode};
use keeper_daemon::{spawn_in_thread, DaemonProxy, InProcessDaemon, ProcessRegistry, ProxyError};

use crate::error::SupervisorError;

/// The supervisor's single live connection to its daemon.
pub struct Connection {
    identity: DaemonIdentity,
    proxy: Arc<dyn DaemonProxy>,
    started_by_us: bool,
    in_process: Option<InProcessDaemon>,
    state: ConnectionState,
}

impl Connection {
    pub fn identity(&self) -> &DaemonIdentity {
        &self.identity
    }

    pub fn proxy(&self) -> Arc<dyn DaemonProxy> {
        self.proxy.clone()
    }

    /// Whether `resolve` launched the daemon. Fixed for the life of the connection.
    pub fn started_by_us(&self) -> bool {
        self.started_by_us
    }

    pub fn is_in_process(&self) -> bool {
        self.in_process.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn mark_lost(&mut self) {
        self.state = ConnectionState::Lost;
        self.proxy.release();
    }

    pub(crate) fn take_in_process(&mut self) -> Option<InProcessDaemon> {
        self.in_process.take()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("started_by_us", &self.started_by_us)
            .field("in_process", &self.in_process.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// Connect to the daemon for `identity`, launching one if none is running.
///
/// Failures are fatal to the caller and never retried.
pub fn resolve(
    registry: &dyn ProcessRegistry,
    home: &Path,
    identity: &DaemonIdentity,
    mode: LaunchMode,
) -> Result<Connection, SupervisorError> {
    let launch_failed = |err: ProxyError| SupervisorError::LaunchFailed {
        identity: identity.clone(),
        reason: err.to_string(),
    };

    if let Some(pid) = registry.find_process(identity).map_err(launch_failed)? {
        tracing::info!(identity = %identity, pid, "connecting to running daemon");
        let proxy = registry.connect(identity).map_err(launch_failed)?;
        return Ok(Connection {
            identity: identity.clone(),
            proxy,
            started_by_us: false,
            in_process: None,
            state: ConnectionState::Connected,
        });
    }

    tracing::info!(identity = %identity, mode = ?mode, "no daemon running, launching one");
    let in_process = match mode {
        LaunchMode::Process => {
            registry.launch_process(identity).map_err(launch_failed)?;
            None
        }
        LaunchMode::Thread => Some(spawn_in_thread(home, identity).map_err(launch_failed)?),
    };

    let proxy = match registry.connect(identity) {
        Ok(proxy) => proxy,
        Err(err) => {
            if let Some(host) = in_process {
                let _ = host.stop();
            }
            return Err(launch_failed(err));
        }
    };

    Ok(Connection {
        identity: identity.clone(),
        proxy,
        started_by_us: true,
        in_process,
        state: ConnectionState::Connected,
    })
}
