//! Error types for foldersync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from fingerprinting, diffing and reconciling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory walk failed at `path`.
    #[error("walk error at {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The stop signal fired mid-pass.
    #[error("sync pass interrupted")]
    Interrupted,
}

impl SyncError {
    /// Path the error is attached to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SyncError::Io { path, .. } | SyncError::Walk { path, .. } => Some(path),
            _ => None,
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            SyncError::Walk { source, .. } => source
                .io_error()
                .map(|e| e.kind() == std::io::ErrorKind::NotFound)
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Walk`]; falls back to `root` when
/// walkdir has no path for the failure.
pub(crate) fn walk_err(root: &std::path::Path, source: walkdir::Error) -> SyncError {
    let path = source
        .path()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| root.to_path_buf());
    SyncError::Walk { path, source }
}
