pub mod config;
pub mod control;
pub mod daemon;
pub mod errors;
pub mod link;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

use keeper_core::DaemonIdentity;
use keeper_daemon::paths::socket_path;
use keeper_daemon::SocketProxy;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Proxy to an already running daemon; never launches one.
pub(crate) fn connect(identity: &DaemonIdentity) -> Result<SocketProxy> {
    let home = home()?;
    Ok(SocketProxy::new(socket_path(&home, identity)))
}

pub(crate) fn not_running_hint(identity: &DaemonIdentity) -> String {
    format!("is the daemon running? start it with `keeper daemon start --config-name {identity}`")
}
