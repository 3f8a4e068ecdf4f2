//! `keeper errors`: the daemon's queued sync issues.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use keeper_core::DaemonIdentity;
use keeper_daemon::{DaemonProxy, ProxyError};
use keeper_supervisor::classify;

use super::{connect, not_running_hint};

/// Arguments for `keeper errors`.
#[derive(Args, Debug)]
pub struct ErrorsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Acknowledge the listed errors at the daemon.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Tabled)]
struct ErrorRow {
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "message")]
    message: String,
    #[tabled(rename = "recovery")]
    recovery: String,
}

impl ErrorsArgs {
    pub fn run(self, identity: &DaemonIdentity) -> Result<()> {
        let proxy = connect(identity)?;
        let errors = match proxy.pending_errors() {
            Ok(errors) => errors,
            Err(err @ ProxyError::DaemonNotRunning { .. }) => {
                return Err(err).context(not_running_hint(identity));
            }
            Err(err) => return Err(err).context("failed to read daemon errors"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&errors).context("failed to serialize errors")?
            );
        } else if errors.is_empty() {
            println!("No sync issues.");
        } else {
            let rows: Vec<ErrorRow> = errors
                .iter()
                .map(|err| ErrorRow {
                    kind: err.kind.to_string(),
                    title: err.title.clone(),
                    message: err.message.clone(),
                    recovery: format!("{:?}", classify(&err.kind)),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        if self.clear && !errors.is_empty() {
            proxy.clear_errors().context("failed to clear daemon errors")?;
            println!("cleared {} error(s)", errors.len());
        }
        Ok(())
    }
}
