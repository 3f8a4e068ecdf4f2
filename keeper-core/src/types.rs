//! Domain types shared by the daemon host, the supervisor and the CLI.
//!
//! Everything that crosses the daemon socket is serializable via serde +
//! serde_json. Wire names for error kinds are fixed strings (see
//! [`DaemonErrorKind::wire_name`]).

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity used when neither `--config-name` nor `KEEPER_CONFIG` is set.
pub const DEFAULT_IDENTITY: &str = "keeper";

/// Environment variable carrying the configuration identity.
pub const IDENTITY_ENV: &str = "KEEPER_CONFIG";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Configuration name selecting which daemon instance to address.
///
/// At most one live daemon process exists per identity on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaemonIdentity(pub String);

impl DaemonIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity from `KEEPER_CONFIG`, or [`DEFAULT_IDENTITY`] when unset or blank.
    pub fn from_env() -> Self {
        match std::env::var(IDENTITY_ENV) {
            Ok(name) if !name.trim().is_empty() => Self(name.trim().to_owned()),
            _ => Self::default(),
        }
    }
}

impl Default for DaemonIdentity {
    fn default() -> Self {
        Self(DEFAULT_IDENTITY.to_owned())
    }
}

impl fmt::Display for DaemonIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DaemonIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DaemonIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Sync state reported by the daemon. Doubles as the tray icon key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Paused,
    Stopped,
    #[default]
    Disconnected,
    SyncError,
}

impl SyncStatus {
    /// Short human-readable label used for the status menu entry and tooltip.
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "Up to date",
            SyncStatus::Syncing => "Syncing...",
            SyncStatus::Paused => "Paused",
            SyncStatus::Stopped => "Syncing stopped",
            SyncStatus::Disconnected => "Connecting...",
            SyncStatus::SyncError => "Sync error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One poll's worth of daemon state. Compared by value between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub paused: bool,
    pub error_count: usize,
    pub usage: String,
    pub recent_changes: Vec<String>,
}

impl StatusSnapshot {
    /// Icon shown for this snapshot: `Paused` wins over the reported status.
    pub fn icon(&self) -> SyncStatus {
        if self.paused {
            SyncStatus::Paused
        } else {
            self.status
        }
    }

    /// The pair the reconciler diffs on.
    pub fn reconcile_key(&self) -> (SyncStatus, usize) {
        (self.status, self.error_count)
    }
}

/// Connection between the front-end and its daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connecting,
    Connected,
    Lost,
}

impl ConnectionState {
    /// Reconciliation ticks only run against a connected proxy.
    pub fn can_poll(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

// ---------------------------------------------------------------------------
// Daemon-reported errors
// ---------------------------------------------------------------------------

/// Class of a daemon-reported error.
///
/// Unknown wire names land in [`DaemonErrorKind::Unclassified`], which keeps
/// the original name for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DaemonErrorKind {
    RevFileError,
    BadInputError,
    CursorResetError,
    DropboxDeletedError,
    AuthRevoked,
    AuthExpired,
    Unclassified(String),
}

impl DaemonErrorKind {
    pub fn wire_name(&self) -> &str {
        match self {
            DaemonErrorKind::RevFileError => "RevFileError",
            DaemonErrorKind::BadInputError => "BadInputError",
            DaemonErrorKind::CursorResetError => "CursorResetError",
            DaemonErrorKind::DropboxDeletedError => "DropboxDeletedError",
            DaemonErrorKind::AuthRevoked => "DropboxAuthError",
            DaemonErrorKind::AuthExpired => "TokenExpiredError",
            DaemonErrorKind::Unclassified(name) => name,
        }
    }

    /// Whether the daemon host should flip to `SyncError` when this is reported.
    pub fn halts_sync(&self) -> bool {
        !matches!(self, DaemonErrorKind::Unclassified(_))
    }
}

impl FromStr for DaemonErrorKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RevFileError" => DaemonErrorKind::RevFileError,
            "BadInputError" => DaemonErrorKind::BadInputError,
            "CursorResetError" => DaemonErrorKind::CursorResetError,
            "DropboxDeletedError" => DaemonErrorKind::DropboxDeletedError,
            "DropboxAuthError" => DaemonErrorKind::AuthRevoked,
            "TokenExpiredError" => DaemonErrorKind::AuthExpired,
            other => DaemonErrorKind::Unclassified(other.to_owned()),
        })
    }
}

impl From<String> for DaemonErrorKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<DaemonErrorKind> for String {
    fn from(kind: DaemonErrorKind) -> Self {
        kind.wire_name().to_owned()
    }
}

impl fmt::Display for DaemonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// An error raised inside the daemon and queued for the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonError {
    #[serde(rename = "type")]
    pub kind: DaemonErrorKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl DaemonError {
    pub fn new(
        kind: DaemonErrorKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.title)
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Why the re-authentication flow is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelinkReason {
    Revoked,
    Expired,
}

/// Fixed response bound to a class of daemon-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    NotifyAndHalt,
    NotifyAndHaltWithTrace,
    RebuildPrompt,
    Relink(RelinkReason),
    AutoRestartFrontend,
    ResumeAfterNotify,
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Result of a remote version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateInfo {
    pub update_available: bool,
    pub latest_release: String,
    pub release_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateInfo {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
