//! # keeper-supervisor
//!
//! Front-end supervision of a keeper daemon.
//!
//! [`Supervisor::run`] resolves (or launches) the daemon for an identity,
//! reconciles its state into [`Surface`] events on a fixed tick, dispatches
//! daemon-reported errors to their recovery actions, and shuts down or
//! restarts cleanly.

pub mod credentials;
pub mod error;
pub mod reconciler;
pub mod recovery;
pub mod resolver;
pub mod restart;
pub mod supervisor;
pub mod surface;
pub mod updates;

pub use credentials::{CredentialCheck, CredentialError, TokenFileCredentials};
pub use error::SupervisorError;
pub use recovery::{classify, Dispatch};
pub use resolver::{resolve, Connection};
pub use restart::{relaunch_command, Relauncher, ShellRelauncher};
pub use supervisor::{Command, Control, Supervisor};
pub use surface::{
    MenuLabels, Notice, PauseAction, RelinkOutcome, SetupRequest, StateChange, Surface,
};
pub use updates::{notice_for, UpdateTask};
