#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::TempDir;

use keeper_core::config::{keys, save_config_at};
use keeper_core::{
    ConfigStore, DaemonError, DaemonErrorKind, DaemonIdentity, RelinkReason, SupervisorSettings, SyncStatus,
    UpdateInfo,
};
use keeper_daemon::{DaemonProxy, ProcessRegistry, ProxyError};
use keeper_supervisor::{
    CredentialCheck, CredentialError, Notice, Relauncher, RelinkOutcome, SetupRequest, StateChange,
    Supervisor, SupervisorError, Surface,
};

pub const FAKE_PID: u32 = 4242;

pub fn identity() -> DaemonIdentity {
    DaemonIdentity::from("fake")
}

fn gone() -> ProxyError {
    ProxyError::DaemonNotRunning {
        socket: PathBuf::from("/nonexistent/daemon.sock"),
    }
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ProxyState {
    status: SyncStatus,
    paused: bool,
    errors: Vec<DaemonError>,
    config: HashMap<(String, String), Value>,
    calls: Vec<&'static str>,
    update: UpdateInfo,
    failing_calls: Vec<&'static str>,
    failing_keys: Vec<(String, String)>,
}

/// In-memory daemon with a call log.
#[derive(Debug)]
pub struct FakeProxy {
    state: Mutex<ProxyState>,
    alive: AtomicBool,
}

impl FakeProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProxyState {
                status: SyncStatus::Idle,
                paused: false,
                errors: Vec::new(),
                config: HashMap::new(),
                calls: Vec::new(),
                update: UpdateInfo::default(),
                failing_calls: Vec::new(),
                failing_keys: Vec::new(),
            }),
            alive: AtomicBool::new(true),
        })
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.state.lock().expect("lock").status = status;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().expect("lock").paused = paused;
    }

    pub fn push_error(&self, kind: DaemonErrorKind) {
        let title = format!("{kind} title");
        let message = format!("{kind} message");
        self.state
            .lock()
            .expect("lock")
            .errors
            .push(DaemonError::new(kind, title, message).with_traceback("Traceback: boom"));
    }

    pub fn set_config_value(&self, section: &str, key: &str, value: Value) {
        self.state
            .lock()
            .expect("lock")
            .config
            .insert((section.to_owned(), key.to_owned()), value);
    }

    pub fn config_value(&self, section: &str, key: &str) -> Option<Value> {
        self.state
            .lock()
            .expect("lock")
            .config
            .get(&(section.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn set_update(&self, update: UpdateInfo) {
        self.state.lock().expect("lock").update = update;
    }

    /// Make every later `call` answer with a daemon-side error.
    pub fn fail_call(&self, call: &'static str) {
        self.state.lock().expect("lock").failing_calls.push(call);
    }

    /// Make `get_config` for one key answer with a daemon-side error.
    pub fn fail_config_key(&self, section: &str, key: &str) {
        self.state
            .lock()
            .expect("lock")
            .failing_keys
            .push((section.to_owned(), key.to_owned()));
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().expect("lock").calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| **call == name).count()
    }

    pub fn queued_errors(&self) -> usize {
        self.state.lock().expect("lock").errors.len()
    }

    fn with<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&mut ProxyState) -> T,
    ) -> Result<T, ProxyError> {
        let mut state = self.state.lock().expect("lock");
        state.calls.push(call);
        if !self.alive.load(Ordering::SeqCst) {
            return Err(gone());
        }
        if state.failing_calls.contains(&call) {
            return Err(ProxyError::Protocol(format!("{call} rejected")));
        }
        Ok(f(&mut state))
    }
}

impl DaemonProxy for FakeProxy {
    fn ping(&self) -> Result<(), ProxyError> {
        self.with("ping", |_| ())
    }

    fn get_config(&self, section: &str, key: &str) -> Result<Value, ProxyError> {
        let entry = (section.to_owned(), key.to_owned());
        let value = self.with("get_config", |s| {
            if s.failing_keys.contains(&entry) {
                return None;
            }
            Some(s.config.get(&entry).cloned().unwrap_or(Value::Null))
        })?;
        value.ok_or_else(|| ProxyError::Protocol("config backend busy".into()))
    }

    fn set_config(&self, section: &str, key: &str, value: Value) -> Result<(), ProxyError> {
        self.with("set_config", |s| {
            s.config.insert((section.to_owned(), key.to_owned()), value);
        })
    }

    fn status(&self) -> Result<SyncStatus, ProxyError> {
        self.with("status", |s| s.status)
    }

    fn paused(&self) -> Result<bool, ProxyError> {
        self.with("paused", |s| s.paused)
    }

    fn pending_errors(&self) -> Result<Vec<DaemonError>, ProxyError> {
        self.with("pending_errors", |s| s.errors.clone())
    }

    fn clear_errors(&self) -> Result<(), ProxyError> {
        self.with("clear_errors", |s| s.errors.clear())
    }

    fn start_sync(&self) -> Result<(), ProxyError> {
        self.with("start_sync", |s| {
            s.status = SyncStatus::Idle;
            s.paused = false;
        })
    }

    fn pause_sync(&self) -> Result<(), ProxyError> {
        self.with("pause_sync", |s| {
            s.status = SyncStatus::Paused;
            s.paused = true;
        })
    }

    fn resume_sync(&self) -> Result<(), ProxyError> {
        self.with("resume_sync", |s| {
            s.status = SyncStatus::Idle;
            s.paused = false;
        })
    }

    fn stop_sync(&self) -> Result<(), ProxyError> {
        self.with("stop_sync", |s| s.status = SyncStatus::Stopped)
    }

    fn rebuild_index(&self) -> Result<(), ProxyError> {
        self.with("rebuild_index", |s| {
            s.status = SyncStatus::Idle;
            s.paused = false;
        })
    }

    fn dropbox_path(&self) -> Result<PathBuf, ProxyError> {
        self.with("dropbox_path", |_| PathBuf::from("/mirror"))
    }

    fn to_local_path(&self, remote_path: &str) -> Result<PathBuf, ProxyError> {
        self.with("to_local_path", |_| {
            PathBuf::from("/mirror").join(remote_path.trim_start_matches('/'))
        })
    }

    fn check_for_updates(&self) -> Result<UpdateInfo, ProxyError> {
        self.with("check_for_updates", |s| s.update.clone())
    }

    fn release(&self) {
        self.state.lock().expect("lock").calls.push("release");
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Process registry over a single [`FakeProxy`].
#[derive(Debug)]
pub struct FakeRegistry {
    pub proxy: Arc<FakeProxy>,
    running: AtomicBool,
    launch_fails: AtomicBool,
    launches: AtomicUsize,
    terminations: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(running: bool) -> Arc<Self> {
        Arc::new(Self {
            proxy: FakeProxy::new(),
            running: AtomicBool::new(running),
            launch_fails: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            terminations: AtomicUsize::new(0),
        })
    }

    pub fn fail_launches(&self) {
        self.launch_fails.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ProcessRegistry for FakeRegistry {
    fn find_process(&self, _identity: &DaemonIdentity) -> Result<Option<u32>, ProxyError> {
        Ok(self.is_running().then_some(FAKE_PID))
    }

    fn launch_process(&self, _identity: &DaemonIdentity) -> Result<(), ProxyError> {
        if self.launch_fails.load(Ordering::SeqCst) {
            return Err(ProxyError::Launch("no such binary".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.proxy.revive();
        Ok(())
    }

    fn terminate_process(&self, _identity: &DaemonIdentity) -> Result<(), ProxyError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.proxy.kill();
        Ok(())
    }

    fn connect(&self, _identity: &DaemonIdentity) -> Result<Arc<dyn DaemonProxy>, ProxyError> {
        if !self.is_running() {
            return Err(gone());
        }
        Ok(self.proxy.clone())
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    State(StateChange),
    Notice(Notice),
    Relink(RelinkReason),
    ReloadErrors,
    Setup(SetupRequest),
    RecentFiles(Vec<PathBuf>),
}

/// Records every event; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    events: Arc<Mutex<Vec<Event>>>,
    setup_succeeds: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup(mut self, succeeds: bool) -> Self {
        self.setup_succeeds = succeeds;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("lock").clone()
    }

    pub fn state_changes(&self) -> Vec<StateChange> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().expect("lock").push(event);
    }
}

impl Surface for RecordingSurface {
    fn state_changed(&mut self, change: &StateChange) {
        self.record(Event::State(change.clone()));
    }

    fn notice(&mut self, notice: &Notice) {
        self.record(Event::Notice(notice.clone()));
    }

    fn relink(&mut self, reason: RelinkReason) -> RelinkOutcome {
        self.record(Event::Relink(reason));
        RelinkOutcome::Cancelled
    }

    fn reload_error_list(&mut self) {
        self.record(Event::ReloadErrors);
    }

    fn run_setup(&mut self, request: SetupRequest) -> bool {
        self.record(Event::Setup(request));
        self.setup_succeeds
    }

    fn show_recent_files(&mut self, files: &[PathBuf]) {
        self.record(Event::RecentFiles(files.to_vec()));
    }
}

// ---------------------------------------------------------------------------
// Credentials and relaunch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum FakeCredentials {
    Linked,
    Unlinked,
    Locked,
}

impl CredentialCheck for FakeCredentials {
    fn is_linked(&self, _identity: &DaemonIdentity) -> Result<bool, CredentialError> {
        match self {
            FakeCredentials::Linked => Ok(true),
            FakeCredentials::Unlinked => Ok(false),
            FakeCredentials::Locked => Err(CredentialError::StoreLocked("keyring locked".into())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingRelauncher {
    pub scheduled: Arc<Mutex<Vec<(u32, DaemonIdentity)>>>,
}

impl RecordingRelauncher {
    pub fn scheduled(&self) -> Vec<(u32, DaemonIdentity)> {
        self.scheduled.lock().expect("lock").clone()
    }
}

impl Relauncher for RecordingRelauncher {
    fn schedule(&self, pid: u32, identity: &DaemonIdentity) -> Result<(), SupervisorError> {
        self.scheduled
            .lock()
            .expect("lock")
            .push((pid, identity.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub home: TempDir,
    pub registry: Arc<FakeRegistry>,
    pub surface: RecordingSurface,
    pub relauncher: RecordingRelauncher,
    pub supervisor: Supervisor<RecordingSurface>,
}

impl Harness {
    pub fn new(daemon_running: bool) -> Self {
        Self::with(daemon_running, FakeCredentials::Linked, RecordingSurface::new())
    }

    pub fn with(
        daemon_running: bool,
        credentials: FakeCredentials,
        surface: RecordingSurface,
    ) -> Self {
        let home = TempDir::new().expect("home");
        let mirror = home.path().join("Keeper");
        std::fs::create_dir_all(&mirror).expect("mirror folder");
        let mut config = ConfigStore::default();
        let (section, key) = keys::MAIN_PATH;
        config.set(section, key, Value::from(mirror.display().to_string()));
        save_config_at(home.path(), &identity(), &config).expect("config");

        let registry = FakeRegistry::new(daemon_running);
        let relauncher = RecordingRelauncher::default();
        let supervisor = Supervisor::new(
            identity(),
            home.path(),
            SupervisorSettings::default(),
            registry.clone(),
            surface.clone(),
        )
        .expect("supervisor")
        .with_credentials(credentials)
        .with_relauncher(relauncher.clone());

        Self {
            home,
            registry,
            surface,
            relauncher,
            supervisor,
        }
    }

    pub fn proxy(&self) -> &Arc<FakeProxy> {
        &self.registry.proxy
    }

    pub fn mirror_folder(&self) -> PathBuf {
        self.home.path().join("Keeper")
    }

    pub fn remove_mirror_folder(&self) {
        std::fs::remove_dir_all(self.mirror_folder()).expect("remove mirror folder");
    }

    /// Start and clear the events startup produced.
    pub fn started(mut self) -> Self {
        self.supervisor.start().expect("start");
        self.surface.events.lock().expect("lock").clear();
        self
    }
}
