//! The events the supervisor produces for whatever renders them.
//!
//! A tray icon, a terminal, or a test recorder implements [`Surface`]; the
//! supervisor never draws anything itself.

use std::path::PathBuf;

use serde::Serialize;

use keeper_core::{RelinkReason, SyncStatus};

/// Label of the pause/resume control. Each variant names the action a click performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseAction {
    Pause,
    Resume,
    Start,
}

impl PauseAction {
    pub fn label(&self) -> &'static str {
        match self {
            PauseAction::Pause => "Pause Syncing",
            PauseAction::Resume => "Resume Syncing",
            PauseAction::Start => "Start Syncing",
        }
    }
}

/// Text of every menu entry the supervisor owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuLabels {
    pub status: String,
    pub pause_action: PauseAction,
    pub pause_enabled: bool,
    pub sync_issues: String,
    pub usage: String,
    pub quit: String,
}

impl MenuLabels {
    /// Labels before the first reconciliation tick.
    pub fn initial(started_by_us: bool, paused: bool) -> Self {
        Self {
            status: SyncStatus::Disconnected.label().to_owned(),
            pause_action: if paused {
                PauseAction::Resume
            } else {
                PauseAction::Pause
            },
            pause_enabled: true,
            sync_issues: sync_issues_label(0),
            usage: String::new(),
            quit: quit_label(started_by_us).to_owned(),
        }
    }
}

pub fn sync_issues_label(error_count: usize) -> String {
    if error_count == 0 {
        "Show Sync Issues...".to_owned()
    } else {
        format!("Show Sync Issues ({error_count})...")
    }
}

pub fn quit_label(started_by_us: bool) -> &'static str {
    if started_by_us {
        "Quit Keeper"
    } else {
        "Quit Keeper GUI"
    }
}

/// A reconciled state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub icon: SyncStatus,
    pub tooltip: String,
    pub error_count: usize,
    pub menu: MenuLabels,
}

/// A blocking, modal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

/// What first-time setup has to provide before the daemon can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetupRequest {
    /// No access token is stored for the identity.
    pub link: bool,
    /// `main.path` does not name an existing directory.
    pub mirror_folder: bool,
}

/// How the re-authentication flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelinkOutcome {
    Cancelled,
    Relinked,
    Unlinked,
}

/// Consumer of supervisor events. Calls happen on the supervisor's event loop.
pub trait Surface {
    fn state_changed(&mut self, change: &StateChange);

    /// Show a modal notice; returns once the user dismissed it.
    fn notice(&mut self, notice: &Notice);

    /// Run the re-authentication flow for `reason`.
    fn relink(&mut self, reason: RelinkReason) -> RelinkOutcome;

    /// The daemon's error count changed; reload any open error listing.
    fn reload_error_list(&mut self) {}

    /// Run first-time setup. `false` aborts startup.
    fn run_setup(&mut self, _request: SetupRequest) -> bool {
        false
    }

    fn show_recent_files(&mut self, _files: &[PathBuf]) {}
}
