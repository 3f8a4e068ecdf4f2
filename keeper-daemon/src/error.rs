use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon protocol, proxy, process registry and host runtime.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] keeper_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("could not launch daemon: {0}")]
    Launch(String),
}

impl ProxyError {
    /// True when the failure means the daemon process is gone or unreachable,
    /// as opposed to the daemon answering with an error.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ProxyError::DaemonNotRunning { .. }
                | ProxyError::Io { .. }
                | ProxyError::ChannelClosed(_)
        )
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProxyError {
    ProxyError::Io {
        path: path.into(),
        source,
    }
}
