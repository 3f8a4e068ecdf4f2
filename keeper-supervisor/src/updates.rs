//! Best-effort update checks, run off the event loop.

use std::sync::Arc;

use tokio::sync::oneshot;

use keeper_core::UpdateInfo;
use keeper_daemon::{DaemonProxy, ProxyError};

use crate::surface::Notice;

/// A pending `check_for_updates` call. Dropping it detaches the listener;
/// the daemon-side check still runs to completion.
#[derive(Debug)]
pub struct UpdateTask {
    rx: oneshot::Receiver<Result<UpdateInfo, ProxyError>>,
    user_requested: bool,
}

impl UpdateTask {
    /// Start the check on the blocking pool. Must be called inside a tokio runtime.
    pub fn spawn(proxy: Arc<dyn DaemonProxy>, user_requested: bool) -> Self {
        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(proxy.check_for_updates());
        });
        Self { rx, user_requested }
    }

    pub fn user_requested(&self) -> bool {
        self.user_requested
    }

    /// Wait for the result. Transport failures come back as [`UpdateInfo::error`].
    pub async fn outcome(&mut self) -> UpdateInfo {
        match (&mut self.rx).await {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => UpdateInfo::failed(err.to_string()),
            Err(_) => UpdateInfo::failed("update check was abandoned"),
        }
    }
}

/// Notice to show for a finished check, if any.
pub fn notice_for(info: &UpdateInfo, user_requested: bool) -> Option<Notice> {
    if let Some(error) = &info.error {
        return user_requested.then(|| Notice::new("Could not check for updates", error));
    }
    if info.update_available {
        return Some(
            Notice::new(
                "Update available",
                format!("Keeper {} is available.", info.latest_release),
            )
            .with_detail(Some(info.release_notes.clone()).filter(|n| !n.is_empty())),
        );
    }
    user_requested.then(|| {
        Notice::new(
            "You're up-to-date!",
            format!(
                "Keeper {} is the newest version available.",
                info.latest_release
            ),
        )
    })
}

/// An automatic check runs when enabled and `interval_secs` passed since `last`.
pub fn automatic_check_due(interval_secs: u64, last: i64, now: i64) -> bool {
    if interval_secs == 0 {
        return false;
    }
    now.saturating_sub(last) > i64::try_from(interval_secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> UpdateInfo {
        UpdateInfo {
            update_available: true,
            latest_release: "0.2.0".into(),
            release_notes: "<ul><li>faster</li></ul>".into(),
            error: None,
        }
    }

    #[test]
    fn failures_only_surface_when_user_asked() {
        let failed = UpdateInfo::failed("offline");
        let notice = notice_for(&failed, true).expect("notice");
        assert_eq!(notice.title, "Could not check for updates");
        assert_eq!(notice.message, "offline");
        assert!(notice_for(&failed, false).is_none());
    }

    #[test]
    fn available_update_always_notifies_with_notes() {
        for user_requested in [true, false] {
            let notice = notice_for(&available(), user_requested).expect("notice");
            assert_eq!(notice.title, "Update available");
            assert_eq!(notice.detail.as_deref(), Some("<ul><li>faster</li></ul>"));
        }
    }

    #[test]
    fn up_to_date_is_silent_unless_requested() {
        let current = UpdateInfo {
            latest_release: "0.1.11".into(),
            ..UpdateInfo::default()
        };
        let notice = notice_for(&current, true).expect("notice");
        assert_eq!(notice.title, "You're up-to-date!");
        assert_eq!(notice.message, "Keeper 0.1.11 is the newest version available.");
        assert!(notice_for(&current, false).is_none());
    }

    #[test]
    fn zero_interval_disables_automatic_checks() {
        assert!(!automatic_check_due(0, 0, 1_000_000));
        assert!(automatic_check_due(60, 0, 61));
        assert!(!automatic_check_due(60, 0, 60));
    }
}
