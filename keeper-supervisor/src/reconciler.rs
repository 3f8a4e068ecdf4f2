//! Poll-and-diff against the daemon's reported state.

use keeper_core::{DaemonError, StatusSnapshot, SyncStatus};
use keeper_daemon::{DaemonProxy, ProxyError};

/// One tick's reads. The error batch is handed on to the recovery dispatcher
/// so the queue is read once per tick.
#[derive(Debug, Clone)]
pub struct Poll {
    pub snapshot: StatusSnapshot,
    pub errors: Vec<DaemonError>,
}

/// Read errors, status and paused flag from the daemon.
pub fn poll(proxy: &dyn DaemonProxy) -> Result<Poll, ProxyError> {
    let errors = proxy.pending_errors()?;
    let status = proxy.status()?;
    let paused = proxy.paused()?;
    Ok(Poll {
        snapshot: StatusSnapshot {
            status,
            paused,
            error_count: errors.len(),
            ..StatusSnapshot::default()
        },
        errors,
    })
}

/// What changed since the last emitted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub icon: SyncStatus,
    pub status: SyncStatus,
    pub error_count: usize,
    pub error_count_changed: bool,
}

/// Caches the last `(status, error_count)` pair and reports material changes.
#[derive(Debug, Default)]
pub struct Reconciler {
    last: Option<(SyncStatus, usize)>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the pair is unchanged. The first observation always
    /// differs from the unconnected baseline.
    pub fn observe(&mut self, snapshot: &StatusSnapshot) -> Option<Change> {
        let key = snapshot.reconcile_key();
        if self.last == Some(key) {
            return None;
        }

        let previous_count = self.last.map(|(_, count)| count).unwrap_or(0);
        self.last = Some(key);
        Some(Change {
            icon: snapshot.icon(),
            status: snapshot.status,
            error_count: snapshot.error_count,
            error_count_changed: previous_count != snapshot.error_count,
        })
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
