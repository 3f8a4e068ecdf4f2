//! Error types for keeper-supervisor.

use thiserror::Error;

use keeper_core::{ConfigError, DaemonIdentity};
use keeper_daemon::ProxyError;

/// All errors the supervisor surfaces to its host.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The daemon answered a call with an error.
    #[error("daemon call failed: {0}")]
    Proxy(#[from] ProxyError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Fatal at startup: the credential store cannot be read.
    #[error("credential store for '{identity}' is locked: {reason}")]
    CredentialStoreLocked {
        identity: DaemonIdentity,
        reason: String,
    },

    /// Fatal at startup: no daemon could be found, launched or connected.
    #[error("could not start or connect to the daemon for '{identity}': {reason}")]
    LaunchFailed {
        identity: DaemonIdentity,
        reason: String,
    },

    /// The daemon went away while connected.
    #[error("lost connection to the daemon for '{identity}'")]
    ConnectionLost { identity: DaemonIdentity },

    #[error("no daemon connection")]
    NotConnected,

    /// The replacement front-end could not be scheduled.
    #[error("could not schedule relaunch: {0}")]
    Relaunch(#[source] std::io::Error),
}

impl SupervisorError {
    /// Errors that end the front-end. Anything else is reported and the
    /// event loop carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SupervisorError::CredentialStoreLocked { .. }
                | SupervisorError::LaunchFailed { .. }
                | SupervisorError::ConnectionLost { .. }
                | SupervisorError::NotConnected
                | SupervisorError::Config(_)
        )
    }
}
