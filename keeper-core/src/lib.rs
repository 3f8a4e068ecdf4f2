//! Keeper core library: domain types and per-identity config.
//!
//! - [`types`]: identity newtype, status/error/recovery enums
//! - [`config`]: daemon config store and front-end settings
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigStore, LaunchMode, SupervisorSettings};
pub use error::ConfigError;
pub use types::{
    ConnectionState, DaemonError, DaemonErrorKind, DaemonIdentity, RecoveryAction, RelinkReason,
    StatusSnapshot, SyncStatus, UpdateInfo, DEFAULT_IDENTITY, IDENTITY_ENV,
};
