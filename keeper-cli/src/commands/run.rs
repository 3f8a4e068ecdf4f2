//! `keeper run`: headless front-end.
//!
//! Drives the supervisor event loop, printing state changes and notices on
//! stdout. Commands are read from stdin, one per line:
//!
//! ```text
//! toggle | rebuild | update | recent | quit | quit-stop | quit-keep
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use tokio::sync::mpsc;

use keeper_core::config::load_settings_at;
use keeper_core::{DaemonIdentity, LaunchMode, RelinkReason};
use keeper_daemon::PidFileRegistry;
use keeper_supervisor::{
    Command, Notice, RelinkOutcome, SetupRequest, StateChange, Supervisor, SupervisorError,
    Surface,
};

use super::home;

/// Arguments for `keeper run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Host the daemon on a thread of this process instead of spawning one.
    #[arg(long)]
    pub in_process: bool,

    /// Print events as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, identity: &DaemonIdentity) -> Result<()> {
        let home = home()?;
        let mut settings =
            load_settings_at(&home, identity).context("failed to load supervisor.yaml")?;
        if self.in_process {
            settings.launch_mode = LaunchMode::Thread;
        }

        let registry =
            Arc::new(PidFileRegistry::new(&home).with_binary(settings.daemon_binary.clone()));
        let surface = ConsoleSurface { json: self.json };
        let supervisor = Supervisor::new(identity.clone(), &home, settings, registry, surface)
            .context("failed to initialise supervisor")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        let result = runtime.block_on(async move {
            let (tx, rx) = mpsc::channel(16);
            spawn_stdin_reader(tx.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(Command::Quit { stop_daemon: None }).await;
                }
            });
            supervisor.run(rx).await
        });

        match result {
            Ok(()) => Ok(()),
            Err(err @ SupervisorError::ConnectionLost { .. }) => {
                Err(err).context("the daemon exited while keeper was running")
            }
            Err(err) => Err(err).context("keeper front-end failed"),
        }
    }
}

/// Map one stdin line to a supervisor command.
fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "toggle" | "pause" | "resume" | "start" => Some(Command::TogglePause),
        "rebuild" => Some(Command::RebuildIndex),
        "update" | "check-updates" => Some(Command::CheckForUpdates),
        "recent" => Some(Command::RecentFiles),
        "quit" => Some(Command::Quit { stop_daemon: None }),
        "quit-stop" => Some(Command::Quit {
            stop_daemon: Some(true),
        }),
        "quit-keep" => Some(Command::Quit {
            stop_daemon: Some(false),
        }),
        _ => None,
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("unknown command: {}", line.trim()),
            }
        }
    });
}

/// Prints supervisor events to stdout.
struct ConsoleSurface {
    json: bool,
}

impl ConsoleSurface {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        println!("{}", json!({ "event": event, "data": payload }));
    }
}

impl Surface for ConsoleSurface {
    fn state_changed(&mut self, change: &StateChange) {
        if self.json {
            self.emit_json("state_changed", json!(change));
            return;
        }
        println!(
            "{} {} | {} | {}{}",
            "[state]".bright_black(),
            change.tooltip.bold(),
            change.menu.pause_action.label(),
            change.menu.sync_issues,
            if change.menu.usage.is_empty() {
                String::new()
            } else {
                format!(" | {}", change.menu.usage)
            },
        );
    }

    fn notice(&mut self, notice: &Notice) {
        if self.json {
            self.emit_json("notice", json!(notice));
            return;
        }
        println!("{} {}", "[notice]".yellow(), notice.title.bold());
        println!("{}", notice.message);
        if let Some(detail) = &notice.detail {
            println!("{detail}");
        }
    }

    fn relink(&mut self, reason: RelinkReason) -> RelinkOutcome {
        if self.json {
            self.emit_json("relink", json!({ "reason": reason }));
        } else {
            println!(
                "{} access was {}; run `keeper link <token>` and restart keeper",
                "[relink]".red(),
                match reason {
                    RelinkReason::Revoked => "revoked",
                    RelinkReason::Expired => "expired",
                }
            );
        }
        RelinkOutcome::Cancelled
    }

    fn reload_error_list(&mut self) {
        if self.json {
            self.emit_json("reload_errors", serde_json::Value::Null);
        }
    }

    fn run_setup(&mut self, request: SetupRequest) -> bool {
        if self.json {
            self.emit_json("setup_required", json!(request));
            return false;
        }
        if request.link {
            println!(
                "{} this identity is not linked; run `keeper link <token>` first",
                "[setup]".yellow()
            );
        }
        if request.mirror_folder {
            println!(
                "{} no mirror folder; run `keeper config set main path <dir>` with an existing directory",
                "[setup]".yellow()
            );
        }
        false
    }

    fn show_recent_files(&mut self, files: &[PathBuf]) {
        if self.json {
            self.emit_json("recent_files", json!(files));
            return;
        }
        if files.is_empty() {
            println!("No recent changes.");
        }
        for file in files {
            println!("  {}", file.display());
        }
    }
}
