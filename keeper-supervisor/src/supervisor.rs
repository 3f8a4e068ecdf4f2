//! The front-end supervisor: startup gate, reconciliation ticks, user
//! commands and shutdown, driven by one cooperative event loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use keeper_core::config::{keys, load_config_at, DEFAULT_UPDATE_INTERVAL_SECS};
use keeper_core::{ConnectionState, DaemonIdentity, SupervisorSettings, SyncStatus, UpdateInfo};
use keeper_daemon::{DaemonProxy, ProcessRegistry, ProxyError};

use crate::credentials::{CredentialCheck, CredentialError, TokenFileCredentials};
use crate::error::SupervisorError;
use crate::reconciler::{self, Reconciler};
use crate::resolver::{self, Connection};
use crate::restart::{Relauncher, ShellRelauncher};
use crate::surface::{
    sync_issues_label, MenuLabels, Notice, PauseAction, SetupRequest, StateChange, Surface,
};
use crate::updates::{automatic_check_due, notice_for, UpdateTask};

/// Whether the event loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Shutdown already ran; the process should exit.
    Exit,
}

/// User-triggered actions delivered to [`Supervisor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    RebuildIndex,
    CheckForUpdates,
    RecentFiles,
    Quit { stop_daemon: Option<bool> },
}

pub struct Supervisor<S: Surface> {
    pub(crate) identity: DaemonIdentity,
    home: PathBuf,
    settings: SupervisorSettings,
    registry: Arc<dyn ProcessRegistry>,
    credentials: Box<dyn CredentialCheck>,
    pub(crate) relauncher: Box<dyn Relauncher>,
    pub(crate) surface: S,
    connection: Option<Connection>,
    reconciler: Reconciler,
    pub(crate) menu: MenuLabels,
    pub(crate) icon: SyncStatus,
    error_count: usize,
    polling: bool,
    pub(crate) unclassified_restarts: u64,
}

impl<S: Surface> Supervisor<S> {
    pub fn new(
        identity: DaemonIdentity,
        home: impl Into<PathBuf>,
        settings: SupervisorSettings,
        registry: Arc<dyn ProcessRegistry>,
        surface: S,
    ) -> Result<Self, SupervisorError> {
        let home = home.into();
        Ok(Self {
            credentials: Box::new(TokenFileCredentials::new(&home)),
            relauncher: Box::new(ShellRelauncher::current()?),
            identity,
            home,
            settings,
            registry,
            surface,
            connection: None,
            reconciler: Reconciler::new(),
            menu: MenuLabels::initial(false, false),
            icon: SyncStatus::Disconnected,
            error_count: 0,
            polling: false,
            unclassified_restarts: 0,
        })
    }

    pub fn with_credentials(mut self, credentials: impl CredentialCheck + 'static) -> Self {
        self.credentials = Box::new(credentials);
        self
    }

    pub fn with_relauncher(mut self, relauncher: impl Relauncher + 'static) -> Self {
        self.relauncher = Box::new(relauncher);
        self
    }

    pub fn identity(&self) -> &DaemonIdentity {
        &self.identity
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn menu(&self) -> &MenuLabels {
        &self.menu
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(Connection::state)
            .unwrap_or_default()
    }

    /// Whether reconciliation ticks are armed.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Check credentials and the mirror folder, resolve the daemon and arm
    /// reconciliation.
    ///
    /// Fatal failures are shown as a notice before they are returned.
    pub fn start(&mut self) -> Result<Control, SupervisorError> {
        let link = match self.credentials.is_linked(&self.identity) {
            Ok(linked) => !linked,
            Err(CredentialError::StoreLocked(reason)) => {
                return Err(self.fatal(SupervisorError::CredentialStoreLocked {
                    identity: self.identity.clone(),
                    reason,
                }));
            }
        };
        let mirror_folder = match self.mirror_folder_exists() {
            Ok(exists) => !exists,
            Err(err) => return Err(self.fatal(err)),
        };

        if link || mirror_folder {
            tracing::info!(identity = %self.identity, link, mirror_folder, "running setup");
            if !self.surface.run_setup(SetupRequest {
                link,
                mirror_folder,
            }) {
                tracing::info!("setup aborted");
                return Ok(Control::Exit);
            }
        }

        let connection = match resolver::resolve(
            self.registry.as_ref(),
            &self.home,
            &self.identity,
            self.settings.launch_mode,
        ) {
            Ok(connection) => connection,
            Err(err) => return Err(self.fatal(err)),
        };

        let proxy = connection.proxy();
        let started_by_us = connection.started_by_us();
        self.connection = Some(connection);
        let paused = proxy.paused();
        let paused = self.guard(paused)?;

        self.menu = MenuLabels::initial(started_by_us, paused);
        self.reconciler.reset();
        self.polling = true;
        tracing::info!(identity = %self.identity, started_by_us, "supervisor connected");
        Ok(Control::Continue)
    }

    /// Whether `main.path` in the identity's config names a directory.
    fn mirror_folder_exists(&self) -> Result<bool, SupervisorError> {
        let config = load_config_at(&self.home, &self.identity)?;
        let (section, key) = keys::MAIN_PATH;
        let path = config.get_str(section, key);
        Ok(!path.is_empty() && Path::new(path).is_dir())
    }

    fn fatal(&mut self, err: SupervisorError) -> SupervisorError {
        tracing::error!(error = %err, "fatal startup error");
        let title = match &err {
            SupervisorError::CredentialStoreLocked { .. } => "Could not access your credentials",
            _ => "Could not start Keeper",
        };
        self.surface.notice(&Notice::new(title, err.to_string()));
        err
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// One reconciliation tick: poll, emit on change, then dispatch errors.
    pub fn tick(&mut self) -> Result<Control, SupervisorError> {
        if !self.polling || !self.connection_state().can_poll() {
            return Ok(Control::Continue);
        }
        let proxy = self.proxy()?;
        let polled = reconciler::poll(proxy.as_ref());
        let polled = self.guard(polled)?;

        if let Some(change) = self.reconciler.observe(&polled.snapshot) {
            if change.error_count_changed {
                self.surface.reload_error_list();
            }
            let (section, key) = keys::ACCOUNT_USAGE;
            match proxy.get_config(section, key) {
                Err(err) if !err.is_connection_loss() => {
                    tracing::warn!(error = %err, "could not read account usage");
                }
                usage => self.menu.usage = value_text(self.guard(usage)?),
            }
            self.menu.pause_action = match (polled.snapshot.paused, self.menu.pause_action) {
                (true, _) => PauseAction::Resume,
                // A stopped daemon keeps its "Start Syncing" control.
                (false, PauseAction::Start) if polled.snapshot.status == SyncStatus::Stopped => {
                    PauseAction::Start
                }
                (false, _) => PauseAction::Pause,
            };
            self.menu.sync_issues = sync_issues_label(change.error_count);
            self.error_count = change.error_count;
            self.emit(change.icon);
        }

        Ok(self.handle_errors(polled.errors)?.control)
    }

    pub(crate) fn emit(&mut self, icon: SyncStatus) {
        self.icon = icon;
        self.menu.status = icon.label().to_owned();
        let change = StateChange {
            icon,
            tooltip: format!("Keeper: {}", icon.label()),
            error_count: self.error_count,
            menu: self.menu.clone(),
        };
        self.surface.state_changed(&change);
    }

    pub(crate) fn proxy(&self) -> Result<Arc<dyn DaemonProxy>, SupervisorError> {
        self.connection
            .as_ref()
            .map(Connection::proxy)
            .ok_or(SupervisorError::NotConnected)
    }

    /// Turn a connection-loss failure into the `Lost` state and a notice.
    pub(crate) fn guard<T>(&mut self, result: Result<T, ProxyError>) -> Result<T, SupervisorError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_connection_loss() => {
                tracing::error!(identity = %self.identity, error = %err, "daemon connection lost");
                self.polling = false;
                if let Some(connection) = self.connection.as_mut() {
                    connection.mark_lost();
                }
                self.surface.notice(&Notice::new(
                    "Lost connection to the sync daemon",
                    "Keeper can no longer reach its daemon and will quit. Please start Keeper again.",
                ));
                Err(SupervisorError::ConnectionLost {
                    identity: self.identity.clone(),
                })
            }
            Err(err) => Err(SupervisorError::Proxy(err)),
        }
    }

    // -----------------------------------------------------------------------
    // User commands
    // -----------------------------------------------------------------------

    /// Pause, resume or start syncing depending on the control's current label.
    pub fn on_start_stop(&mut self) -> Result<(), SupervisorError> {
        if !self.menu.pause_enabled {
            tracing::debug!(identity = %self.identity, "pause control disabled, ignoring toggle");
            return Ok(());
        }
        let proxy = self.proxy()?;
        let (result, next) = match self.menu.pause_action {
            PauseAction::Pause => (proxy.pause_sync(), PauseAction::Resume),
            PauseAction::Resume => (proxy.resume_sync(), PauseAction::Pause),
            PauseAction::Start => (proxy.start_sync(), PauseAction::Pause),
        };
        self.guard(result)?;
        self.menu.pause_action = next;
        self.emit(self.icon);
        Ok(())
    }

    pub fn rebuild_index(&mut self) -> Result<(), SupervisorError> {
        let proxy = self.proxy()?;
        let result = proxy.rebuild_index();
        self.guard(result)?;
        self.menu.pause_action = PauseAction::Pause;
        self.menu.pause_enabled = true;
        self.emit(self.icon);
        Ok(())
    }

    /// Recently changed files, newest first, as local paths.
    pub fn recent_files(&mut self) -> Result<Vec<PathBuf>, SupervisorError> {
        let proxy = self.proxy()?;
        let (section, key) = keys::RECENT_CHANGES;
        let recent = proxy.get_config(section, key);
        let remote: Vec<String> = match self.guard(recent)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        };

        let mut local = Vec::with_capacity(remote.len());
        for path in remote.iter().rev() {
            let mapped = proxy.to_local_path(path);
            local.push(self.guard(mapped)?);
        }
        Ok(local)
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    pub fn check_for_updates(&self, user_requested: bool) -> Result<UpdateTask, SupervisorError> {
        Ok(UpdateTask::spawn(self.proxy()?, user_requested))
    }

    /// Whether the periodic timer should start an automatic check now.
    pub fn automatic_check_due(&mut self) -> Result<bool, SupervisorError> {
        let proxy = self.proxy()?;
        let (section, key) = keys::UPDATE_INTERVAL;
        let interval = proxy.get_config(section, key);
        let interval = self
            .guard(interval)?
            .as_u64()
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS);
        let (section, key) = keys::UPDATE_LAST;
        let last = proxy.get_config(section, key);
        let last = self.guard(last)?.as_i64().unwrap_or(0);
        Ok(automatic_check_due(
            interval,
            last,
            chrono::Utc::now().timestamp(),
        ))
    }

    /// Show the notice for a finished check and record automatic hits.
    pub fn apply_update_result(
        &mut self,
        info: &UpdateInfo,
        user_requested: bool,
    ) -> Result<(), SupervisorError> {
        if let Some(err) = &info.error {
            tracing::warn!(error = %err, user_requested, "update check failed");
        }
        if let Some(notice) = notice_for(info, user_requested) {
            self.surface.notice(&notice);
        }
        if !user_requested && info.update_available {
            let proxy = self.proxy()?;
            let (section, key) = keys::UPDATE_LAST;
            let stored = proxy.set_config(section, key, json!(chrono::Utc::now().timestamp()));
            self.guard(stored)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop polling and, when `stop_daemon` resolves true, the daemon.
    ///
    /// `None` stops the daemon only if this supervisor launched it.
    pub fn shutdown(&mut self, stop_daemon: Option<bool>) -> Result<(), SupervisorError> {
        self.polling = false;
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        let stop = stop_daemon.unwrap_or(connection.started_by_us());
        tracing::info!(identity = %self.identity, stop_daemon = stop, "shutting down supervisor");

        if let Some(host) = connection.take_in_process() {
            // An in-process host cannot outlive this process.
            host.stop()?;
            return Ok(());
        }

        if stop {
            connection.proxy().release();
            self.registry.terminate_process(&self.identity)?;
        }
        Ok(())
    }

    /// Shut down and terminate the front-end process.
    pub fn quit(mut self, stop_daemon: Option<bool>) -> ! {
        if let Err(err) = self.shutdown(stop_daemon) {
            tracing::error!(error = %err, "shutdown failed");
        }
        std::process::exit(0)
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Start up, then drive ticks, update checks and `commands` until quit.
    ///
    /// Every exit after a successful resolution goes through [`shutdown`],
    /// so a daemon this supervisor launched is stopped even when a fatal
    /// error ends the loop. Non-fatal daemon errors are logged (ticks and
    /// update checks) or shown as a notice (user commands).
    ///
    /// [`shutdown`]: Supervisor::shutdown
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), SupervisorError> {
        let outcome = match self.start() {
            Ok(Control::Exit) => return Ok(()),
            Ok(Control::Continue) => self.event_loop(&mut commands).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(stop_daemon) => self.shutdown(stop_daemon),
            Err(err) => {
                if let Err(shutdown_err) = self.shutdown(None) {
                    tracing::error!(error = %shutdown_err, "shutdown after fatal error failed");
                }
                Err(err)
            }
        }
    }

    /// Returns the quit request's stop flag once the loop should end.
    async fn event_loop(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Result<Option<bool>, SupervisorError> {
        let mut ticker = interval(Duration::from_millis(self.settings.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut update_timer =
            interval(Duration::from_secs(self.settings.update_check_period_secs.max(1)));
        update_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending_update: Option<UpdateTask> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick() {
                        Ok(Control::Continue) => {}
                        // Restart already shut down.
                        Ok(Control::Exit) => return Ok(None),
                        Err(err) => skip_unless_fatal(err, "reconciliation tick")?,
                    }
                }
                _ = update_timer.tick(), if pending_update.is_none() => {
                    match self.automatic_check_due() {
                        Ok(true) => match self.check_for_updates(false) {
                            Ok(task) => pending_update = Some(task),
                            Err(err) => skip_unless_fatal(err, "automatic update check")?,
                        },
                        Ok(false) => {}
                        Err(err) => skip_unless_fatal(err, "automatic update check")?,
                    }
                }
                (info, user_requested) = wait_update(&mut pending_update), if pending_update.is_some() => {
                    pending_update = None;
                    if let Err(err) = self.apply_update_result(&info, user_requested) {
                        skip_unless_fatal(err, "update result")?;
                    }
                }
                command = commands.recv() => {
                    let result = match command {
                        Some(Command::Quit { stop_daemon }) => return Ok(stop_daemon),
                        None => return Ok(None),
                        Some(Command::TogglePause) => self.on_start_stop(),
                        Some(Command::RebuildIndex) => self.rebuild_index(),
                        Some(Command::CheckForUpdates) => {
                            // A user request replaces any automatic check in flight.
                            self.check_for_updates(true).map(|task| pending_update = Some(task))
                        }
                        Some(Command::RecentFiles) => self
                            .recent_files()
                            .map(|files| self.surface.show_recent_files(&files)),
                    };
                    if let Err(err) = result {
                        self.command_failed(err)?;
                    }
                }
            }
        }
    }

    fn command_failed(&mut self, err: SupervisorError) -> Result<(), SupervisorError> {
        if err.is_fatal() {
            return Err(err);
        }
        tracing::warn!(error = %err, "command failed");
        self.surface
            .notice(&Notice::new("Could not complete the action", err.to_string()));
        Ok(())
    }
}

fn skip_unless_fatal(err: SupervisorError, context: &str) -> Result<(), SupervisorError> {
    if err.is_fatal() {
        return Err(err);
    }
    tracing::warn!(context, error = %err, "daemon call failed, continuing");
    Ok(())
}

async fn wait_update(task: &mut Option<UpdateTask>) -> (UpdateInfo, bool) {
    match task {
        Some(task) => (task.outcome().await, task.user_requested()),
        None => std::future::pending().await,
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
