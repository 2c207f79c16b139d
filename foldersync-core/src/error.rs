//! Error types for foldersync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is fatal at startup: the poll loop is never entered with an
/// invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required setting was not provided by any layer.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("source directory does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("source is not a directory: {path}")]
    SourceNotDirectory { path: PathBuf },

    #[error("replica exists but is not a directory: {path}")]
    ReplicaNotDirectory { path: PathBuf },

    /// Source and replica are the same tree, or one contains the other.
    #[error("source {source_dir} and replica {replica} must not overlap")]
    Overlap { source_dir: PathBuf, replica: PathBuf },

    #[error("interval must be a positive number of seconds, got {0}")]
    InvalidInterval(u64),

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.foldersync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`ConfigError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
