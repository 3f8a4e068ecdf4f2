//! Error types for keeper-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or saving per-identity config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, read-only filesystem, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.keeper/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// Identity names become directory names and must stay inside `~/.keeper/`.
    #[error("invalid config name '{name}': must be non-empty and contain no path separators")]
    InvalidIdentity { name: String },
}
