//! `keeper pause`, `keeper resume` and `keeper check-updates`.

use anyhow::{Context, Result};
use colored::Colorize;

use keeper_core::DaemonIdentity;
use keeper_daemon::{DaemonProxy, ProxyError};
use keeper_supervisor::notice_for;

use super::{connect, not_running_hint};

pub fn pause(identity: &DaemonIdentity) -> Result<()> {
    let proxy = connect(identity)?;
    with_hint(proxy.pause_sync(), identity).context("failed to pause syncing")?;
    println!("syncing paused");
    Ok(())
}

pub fn resume(identity: &DaemonIdentity) -> Result<()> {
    let proxy = connect(identity)?;
    with_hint(proxy.resume_sync(), identity).context("failed to resume syncing")?;
    println!("syncing resumed");
    Ok(())
}

pub fn check_updates(identity: &DaemonIdentity) -> Result<()> {
    let proxy = connect(identity)?;
    let info =
        with_hint(proxy.check_for_updates(), identity).context("failed to check for updates")?;

    if let Some(notice) = notice_for(&info, true) {
        let title = if info.error.is_some() {
            notice.title.red().bold()
        } else if info.update_available {
            notice.title.green().bold()
        } else {
            notice.title.bold()
        };
        println!("{title}");
        println!("{}", notice.message);
        if let Some(detail) = notice.detail {
            println!();
            println!("{detail}");
        }
    }
    Ok(())
}

fn with_hint<T>(result: Result<T, ProxyError>, identity: &DaemonIdentity) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err @ ProxyError::DaemonNotRunning { .. }) => {
            Err(err).context(not_running_hint(identity))
        }
        Err(err) => Err(err.into()),
    }
}
