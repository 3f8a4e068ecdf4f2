//! Per-identity configuration on disk.
//!
//! # Storage layout
//!
//! ```text
//! ~/.keeper/
//!   <identity>/
//!     config.yaml       (daemon-owned section/key store: mode 0600)
//!     supervisor.yaml   (optional front-end settings)
//!     daemon.sock, daemon.pid, logs/   (see keeper-daemon paths)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::DaemonIdentity;

/// Well-known `(section, key)` pairs read by the front-end.
pub mod keys {
    pub const MAIN_PATH: (&str, &str) = ("main", "path");
    pub const ACCOUNT_ID: (&str, &str) = ("account", "account_id");
    pub const ACCOUNT_EMAIL: (&str, &str) = ("account", "email");
    pub const ACCOUNT_USAGE: (&str, &str) = ("account", "usage");
    pub const RECENT_CHANGES: (&str, &str) = ("internal", "recent_changes");
    pub const UPDATE_LAST: (&str, &str) = ("app", "update_notification_last");
    pub const UPDATE_INTERVAL: (&str, &str) = ("app", "update_notification_interval");
    pub const RELEASE_FEED_URL: (&str, &str) = ("app", "release_feed_url");
}

/// One week, the default spacing of automatic update notifications.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.keeper/`: pure, no I/O.
pub fn keeper_root(home: &Path) -> PathBuf {
    home.join(".keeper")
}

/// `<home>/.keeper/<identity>/`: pure, no I/O.
///
/// Callers that create or read files go through [`validate_identity`] first.
pub fn identity_dir_at(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    keeper_root(home).join(identity.as_str())
}

/// Creates `<home>/.keeper/<identity>/` (mode `0700`) if it does not yet exist.
pub fn ensure_identity_dir_at(
    home: &Path,
    identity: &DaemonIdentity,
) -> Result<PathBuf, ConfigError> {
    validate_identity(identity)?;
    let dir = identity_dir_at(home, identity);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

pub fn config_path_at(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    identity_dir_at(home, identity).join("config.yaml")
}

pub fn settings_path_at(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    identity_dir_at(home, identity).join("supervisor.yaml")
}

pub fn validate_identity(identity: &DaemonIdentity) -> Result<(), ConfigError> {
    let name = identity.as_str();
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ConfigError::InvalidIdentity {
            name: name.to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Daemon config store
// ---------------------------------------------------------------------------

/// Sectioned key/value store served by the daemon through `get_config` / `set_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigStore {
    sections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        let mut store = Self {
            sections: BTreeMap::new(),
        };
        store.set(keys::MAIN_PATH.0, keys::MAIN_PATH.1, Value::from(""));
        store.set(keys::ACCOUNT_ID.0, keys::ACCOUNT_ID.1, Value::from(""));
        store.set(keys::ACCOUNT_EMAIL.0, keys::ACCOUNT_EMAIL.1, Value::from(""));
        store.set(keys::ACCOUNT_USAGE.0, keys::ACCOUNT_USAGE.1, Value::from(""));
        store.set(
            keys::RECENT_CHANGES.0,
            keys::RECENT_CHANGES.1,
            Value::Array(Vec::new()),
        );
        store.set(keys::UPDATE_LAST.0, keys::UPDATE_LAST.1, Value::from(0));
        store.set(
            keys::UPDATE_INTERVAL.0,
            keys::UPDATE_INTERVAL.1,
            Value::from(DEFAULT_UPDATE_INTERVAL_SECS),
        );
        store.set(
            keys::RELEASE_FEED_URL.0,
            keys::RELEASE_FEED_URL.1,
            Value::from(""),
        );
        store
    }
}

impl ConfigStore {
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
    }

    /// String value, or `""` when absent or not a string.
    pub fn get_str(&self, section: &str, key: &str) -> &str {
        self.get(section, key).and_then(Value::as_str).unwrap_or("")
    }

    /// Fill in any well-known key missing from a store loaded off disk.
    fn merge_defaults(&mut self) {
        for (section, entries) in ConfigStore::default().sections {
            let target = self.sections.entry(section).or_default();
            for (key, value) in entries {
                target.entry(key).or_insert(value);
            }
        }
    }
}

/// Load `<home>/.keeper/<identity>/config.yaml`; a missing file yields defaults.
pub fn load_config_at(home: &Path, identity: &DaemonIdentity) -> Result<ConfigStore, ConfigError> {
    validate_identity(identity)?;
    let path = config_path_at(home, identity);
    if !path.exists() {
        return Ok(ConfigStore::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(ConfigStore::default());
    }
    let mut store: ConfigStore =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    store.merge_defaults();
    Ok(store)
}

/// `load_config_at` convenience wrapper.
pub fn load_config(identity: &DaemonIdentity) -> Result<ConfigStore, ConfigError> {
    load_config_at(&home()?, identity)
}

/// Atomically save the store.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_config_at(
    home: &Path,
    identity: &DaemonIdentity,
    store: &ConfigStore,
) -> Result<(), ConfigError> {
    ensure_identity_dir_at(home, identity)?;
    let path = config_path_at(home, identity);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(store)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_config_at` convenience wrapper.
pub fn save_config(identity: &DaemonIdentity, store: &ConfigStore) -> Result<(), ConfigError> {
    save_config_at(&home()?, identity, store)
}

// ---------------------------------------------------------------------------
// 3. Front-end settings
// ---------------------------------------------------------------------------

/// How the resolver starts a daemon that is not yet running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Separate OS process.
    #[default]
    Process,
    /// Worker thread inside the front-end, for hosts that cannot spawn processes.
    Thread,
}

/// Optional `supervisor.yaml`; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub poll_interval_ms: u64,
    pub update_check_period_secs: u64,
    pub launch_mode: LaunchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_binary: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            update_check_period_secs: 30 * 60,
            launch_mode: LaunchMode::Process,
            daemon_binary: None,
        }
    }
}

pub fn load_settings_at(
    home: &Path,
    identity: &DaemonIdentity,
) -> Result<SupervisorSettings, ConfigError> {
    validate_identity(identity)?;
    let path = settings_path_at(home, identity);
    if !path.exists() {
        return Ok(SupervisorSettings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(SupervisorSettings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_settings_at` convenience wrapper.
pub fn load_settings(identity: &DaemonIdentity) -> Result<SupervisorSettings, ConfigError> {
    load_settings_at(&home()?, identity)
}

/// The user's home directory, root of `~/.keeper/`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
