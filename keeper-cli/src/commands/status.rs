//! `keeper status`: one-shot view of the daemon's state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use keeper_core::config::keys;
use keeper_core::{DaemonIdentity, SyncStatus};
use keeper_daemon::{DaemonProxy, ProxyError};

use super::{connect, not_running_hint};

/// Arguments for `keeper status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    identity: String,
    status: SyncStatus,
    label: String,
    paused: bool,
    errors: usize,
    usage: String,
    mirror: String,
}

impl StatusArgs {
    pub fn run(self, identity: &DaemonIdentity) -> Result<()> {
        let proxy = connect(identity)?;
        let report = match build_report(&proxy, identity) {
            Ok(report) => report,
            Err(err @ ProxyError::DaemonNotRunning { .. }) => {
                return Err(err).context(not_running_hint(identity));
            }
            Err(err) => return Err(err).context("failed to query daemon"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

fn build_report(proxy: &dyn DaemonProxy, identity: &DaemonIdentity) -> Result<StatusReport, ProxyError> {
    let status = proxy.status()?;
    let paused = proxy.paused()?;
    let errors = proxy.pending_errors()?.len();
    let (section, key) = keys::ACCOUNT_USAGE;
    let usage = proxy
        .get_config(section, key)?
        .as_str()
        .unwrap_or_default()
        .to_owned();
    let mirror = proxy.dropbox_path()?.display().to_string();

    let icon = if paused { SyncStatus::Paused } else { status };
    Ok(StatusReport {
        identity: identity.to_string(),
        status,
        label: icon.label().to_owned(),
        paused,
        errors,
        usage,
        mirror,
    })
}

fn print_report(report: &StatusReport) {
    println!(
        "Keeper v{} | {} | {}",
        env!("CARGO_PKG_VERSION"),
        report.identity.bold(),
        colored_label(report),
    );
    if !report.mirror.is_empty() {
        println!("mirror: {}", report.mirror);
    }
    if !report.usage.is_empty() {
        println!("usage:  {}", report.usage);
    }
    if report.errors > 0 {
        println!(
            "{}",
            format!("{} sync issue(s); run `keeper errors`", report.errors).yellow()
        );
    }
}

fn colored_label(report: &StatusReport) -> String {
    let label = report.label.as_str();
    if report.paused {
        return label.yellow().to_string();
    }
    match report.status {
        SyncStatus::Idle => label.green().to_string(),
        SyncStatus::Syncing => label.cyan().to_string(),
        SyncStatus::SyncError => label.red().bold().to_string(),
        SyncStatus::Paused | SyncStatus::Stopped | SyncStatus::Disconnected => {
            label.bright_black().to_string()
        }
    }
}
