//! Error classification and recovery dispatch.
//!
//! Every daemon error kind maps to exactly one [`RecoveryAction`]. A batch is
//! acknowledged at the daemon before anything is acted on, and only the last
//! error in the batch is surfaced.

use keeper_core::{DaemonError, DaemonErrorKind, RecoveryAction, RelinkReason, SyncStatus};

use crate::error::SupervisorError;
use crate::supervisor::{Control, Supervisor};
use crate::surface::{Notice, PauseAction, Surface};

pub const REBUILD_TITLE: &str = "Dropbox has reset its sync state.";
pub const REBUILD_MESSAGE: &str = "Please go to \"Rebuild index...\" to re-sync your Dropbox.";
pub const UNEXPECTED_TITLE: &str = "An unexpected error occurred.";

/// The fixed recovery action for an error kind.
pub fn classify(kind: &DaemonErrorKind) -> RecoveryAction {
    match kind {
        DaemonErrorKind::RevFileError | DaemonErrorKind::BadInputError => {
            RecoveryAction::NotifyAndHalt
        }
        DaemonErrorKind::CursorResetError => RecoveryAction::RebuildPrompt,
        DaemonErrorKind::DropboxDeletedError => RecoveryAction::AutoRestartFrontend,
        DaemonErrorKind::AuthRevoked => RecoveryAction::Relink(RelinkReason::Revoked),
        DaemonErrorKind::AuthExpired => RecoveryAction::Relink(RelinkReason::Expired),
        DaemonErrorKind::Unclassified(_) => RecoveryAction::ResumeAfterNotify,
    }
}

/// Result of handling one error batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// `None` for an empty batch.
    pub action: Option<RecoveryAction>,
    pub control: Control,
}

impl<S: Surface> Supervisor<S> {
    /// Acknowledge `batch` at the daemon, then run the recovery action of its last error.
    pub fn handle_errors(&mut self, batch: Vec<DaemonError>) -> Result<Dispatch, SupervisorError> {
        let Some(latest) = batch.last().cloned() else {
            return Ok(Dispatch {
                action: None,
                control: Control::Continue,
            });
        };

        let proxy = self.proxy()?;
        let cleared = proxy.clear_errors();
        self.guard(cleared)?;
        if batch.len() > 1 {
            tracing::debug!(
                acknowledged = batch.len() - 1,
                "earlier errors in batch acknowledged without notice"
            );
        }

        let action = classify(&latest.kind);
        tracing::info!(kind = %latest.kind, action = ?action, "handling daemon error");

        let stopped = proxy.stop_sync();
        self.guard(stopped)?;
        self.mark_sync_stopped();

        let control = match action {
            RecoveryAction::NotifyAndHalt => {
                self.surface
                    .notice(&Notice::new(&latest.title, &latest.message));
                Control::Continue
            }
            RecoveryAction::NotifyAndHaltWithTrace => {
                self.surface.notice(
                    &Notice::new(&latest.title, &latest.message)
                        .with_detail(latest.traceback.clone()),
                );
                Control::Continue
            }
            RecoveryAction::RebuildPrompt => {
                self.surface
                    .notice(&Notice::new(REBUILD_TITLE, REBUILD_MESSAGE));
                Control::Continue
            }
            RecoveryAction::AutoRestartFrontend => self.restart()?,
            RecoveryAction::Relink(reason) => {
                self.menu.pause_enabled = false;
                self.emit(SyncStatus::SyncError);
                let outcome = self.surface.relink(reason);
                tracing::info!(reason = ?reason, outcome = ?outcome, "relink flow finished");
                Control::Continue
            }
            RecoveryAction::ResumeAfterNotify => {
                self.unclassified_restarts += 1;
                tracing::warn!(
                    kind = %latest.kind,
                    attempt = self.unclassified_restarts,
                    "restarting sync after unclassified daemon error"
                );
                self.surface.notice(
                    &Notice::new(UNEXPECTED_TITLE, &latest.message)
                        .with_detail(latest.traceback.clone()),
                );
                let started = proxy.start_sync();
                self.guard(started)?;
                self.menu.pause_action = PauseAction::Pause;
                self.emit(self.icon);
                Control::Continue
            }
        };

        Ok(Dispatch {
            action: Some(action),
            control,
        })
    }

    /// Error icon and a "Start Syncing" control after any stop-sync recovery.
    fn mark_sync_stopped(&mut self) {
        self.menu.pause_action = PauseAction::Start;
        self.emit(SyncStatus::SyncError);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DaemonErrorKind::RevFileError, RecoveryAction::NotifyAndHalt)]
    #[case(DaemonErrorKind::BadInputError, RecoveryAction::NotifyAndHalt)]
    #[case(DaemonErrorKind::CursorResetError, RecoveryAction::RebuildPrompt)]
    #[case(DaemonErrorKind::DropboxDeletedError, RecoveryAction::AutoRestartFrontend)]
    #[case(DaemonErrorKind::AuthRevoked, RecoveryAction::Relink(RelinkReason::Revoked))]
    #[case(DaemonErrorKind::AuthExpired, RecoveryAction::Relink(RelinkReason::Expired))]
    #[case(
        DaemonErrorKind::Unclassified("KeyError".into()),
        RecoveryAction::ResumeAfterNotify
    )]
    fn kinds_map_to_fixed_actions(#[case] kind: DaemonErrorKind, #[case] expected: RecoveryAction) {
        assert_eq!(classify(&kind), expected);
        assert_eq!(classify(&kind), classify(&kind.clone()));
    }
}
