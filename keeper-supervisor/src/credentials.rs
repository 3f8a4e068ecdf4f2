//! Credential presence check, consumed at startup.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use keeper_core::config::{ensure_identity_dir_at, identity_dir_at};
use keeper_core::{ConfigError, DaemonIdentity};

pub const TOKEN_FILE: &str = "token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store locked: {0}")]
    StoreLocked(String),
}

/// Answers whether an identity has a linked account.
pub trait CredentialCheck {
    fn is_linked(&self, identity: &DaemonIdentity) -> Result<bool, CredentialError>;
}

/// Looks for a non-empty `token` file in the identity directory.
#[derive(Debug, Clone)]
pub struct TokenFileCredentials {
    home: PathBuf,
}

impl TokenFileCredentials {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn token_path(&self, identity: &DaemonIdentity) -> PathBuf {
        token_path_at(&self.home, identity)
    }

    /// Store `token` for `identity` (mode `0600`).
    pub fn link(&self, identity: &DaemonIdentity, token: &str) -> Result<(), ConfigError> {
        let dir = ensure_identity_dir_at(&self.home, identity)?;
        let path = dir.join(TOKEN_FILE);
        fs::write(&path, token.trim())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Remove the stored token. Returns whether one existed.
    pub fn unlink(&self, identity: &DaemonIdentity) -> Result<bool, ConfigError> {
        match fs::remove_file(self.token_path(identity)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn token_path_at(home: &Path, identity: &DaemonIdentity) -> PathBuf {
    identity_dir_at(home, identity).join(TOKEN_FILE)
}

impl CredentialCheck for TokenFileCredentials {
    fn is_linked(&self, identity: &DaemonIdentity) -> Result<bool, CredentialError> {
        let path = self.token_path(identity);
        match fs::read_to_string(&path) {
            Ok(token) => Ok(!token.trim().is_empty()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CredentialError::StoreLocked(format!(
                "{}: {err}",
                path.display()
            ))),
        }
    }
}
