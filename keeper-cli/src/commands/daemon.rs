//! `keeper daemon`: background daemon lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;

use keeper_core::DaemonIdentity;
use keeper_daemon::paths::{socket_path, stderr_log_path};
use keeper_daemon::{
    request_shutdown, start_blocking, DaemonProxy, PidFileRegistry, ProcessRegistry, ProxyError,
};

use super::home;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon host in the foreground.
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Report whether the daemon is running.
    Status,
}

pub fn run(command: DaemonCommand, identity: &DaemonIdentity) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home, identity).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_shutdown(&socket_path(&home, identity)) {
            Ok(()) => println!("daemon stop requested"),
            Err(ProxyError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let registry = PidFileRegistry::new(&home);
            let payload = match registry
                .find_process(identity)
                .context("failed to look up daemon")?
            {
                Some(pid) => {
                    let proxy = registry.connect(identity).context("failed to connect")?;
                    json!({
                        "running": true,
                        "pid": pid,
                        "identity": identity.as_str(),
                        "status": proxy.status().context("failed to read status")?,
                        "paused": proxy.paused().context("failed to read paused flag")?,
                        "socket": socket_path(&home, identity).display().to_string(),
                    })
                }
                None => json!({
                    "running": false,
                    "identity": identity.as_str(),
                    "socket": socket_path(&home, identity).display().to_string(),
                    "stderr_log": stderr_log_path(&home, identity).display().to_string(),
                }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
    }

    Ok(())
}
