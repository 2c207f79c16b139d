//! Layered configuration: YAML file, then command-line overrides, then
//! defaults.
//!
//! # Storage layout
//!
//! ```text
//! ~/.foldersync/
//!   config.yaml     (optional; same keys as `PartialConfig`)
//!   logs/sync.log   (default log file when logging to a file)
//! ```
//!
//! # API pattern
//!
//! Functions that touch the home directory come in two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Polling interval used when no layer provides one.
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// How a pass decides whether reconciliation is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Reconcile only when the source (or, with drift detection, the replica)
    /// snapshot changed since the previous pass.
    #[default]
    Snapshot,
    /// Diff and reconcile on every pass.
    Always,
}

/// One configuration layer. Every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub source: Option<PathBuf>,
    pub replica: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub change_detection: Option<ChangeDetection>,
    pub detect_replica_drift: Option<bool>,
    pub use_ledger: Option<bool>,
    pub preserve_metadata: Option<bool>,
    pub json_logs: Option<bool>,
}

/// Fully resolved configuration consumed by the engine and the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub interval_secs: u64,
    pub log_file: Option<PathBuf>,
    pub change_detection: ChangeDetection,
    /// Replica-side drift triggers re-detection; the source stays
    /// authoritative for content either way.
    pub detect_replica_drift: bool,
    pub use_ledger: bool,
    pub preserve_metadata: bool,
    pub json_logs: bool,
}

// ---------------------------------------------------------------------------
// 2. Merge + resolve
// ---------------------------------------------------------------------------

impl PartialConfig {
    /// Merge `overrides` on top of `self`; values set in `overrides` win.
    pub fn merge(self, overrides: PartialConfig) -> PartialConfig {
        PartialConfig {
            source: overrides.source.or(self.source),
            replica: overrides.replica.or(self.replica),
            interval_secs: overrides.interval_secs.or(self.interval_secs),
            log_file: overrides.log_file.or(self.log_file),
            change_detection: overrides.change_detection.or(self.change_detection),
            detect_replica_drift: overrides.detect_replica_drift.or(self.detect_replica_drift),
            use_ledger: overrides.use_ledger.or(self.use_ledger),
            preserve_metadata: overrides.preserve_metadata.or(self.preserve_metadata),
            json_logs: overrides.json_logs.or(self.json_logs),
        }
    }

    /// Fill defaults and validate.
    ///
    /// Does not touch the replica; call [`SyncConfig::prepare`] before the
    /// first pass.
    pub fn resolve(self) -> Result<SyncConfig, ConfigError> {
        let config = SyncConfig {
            source: self.source.ok_or(ConfigError::Missing("source"))?,
            replica: self.replica.ok_or(ConfigError::Missing("replica"))?,
            interval_secs: self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            log_file: self.log_file,
            change_detection: self.change_detection.unwrap_or_default(),
            detect_replica_drift: self.detect_replica_drift.unwrap_or(true),
            use_ledger: self.use_ledger.unwrap_or(true),
            preserve_metadata: self.preserve_metadata.unwrap_or(true),
            json_logs: self.json_logs.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }
}

impl SyncConfig {
    /// Configuration with defaults for everything but the two roots.
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        SyncConfig {
            source: source.into(),
            replica: replica.into(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            log_file: None,
            change_detection: ChangeDetection::default(),
            detect_replica_drift: true,
            use_ledger: true,
            preserve_metadata: true,
            json_logs: false,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Check the interval and that the source is an existing directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        match std::fs::metadata(&self.source) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ConfigError::SourceNotDirectory {
                path: self.source.clone(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::SourceNotFound {
                    path: self.source.clone(),
                })
            }
            Err(err) => Err(io_err(&self.source, err)),
        }
    }

    /// Validate, then make both roots absolute and reject overlapping trees
    /// or a replica that is not a directory. Nothing is created.
    pub fn check(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        let source = std::fs::canonicalize(&self.source).map_err(|e| io_err(&self.source, e))?;
        let replica = absolute_from_existing_ancestor(&self.replica)?;

        if replica.starts_with(&source) || source.starts_with(&replica) {
            return Err(ConfigError::Overlap {
                source_dir: source,
                replica,
            });
        }

        match std::fs::metadata(&replica) {
            Ok(meta) if !meta.is_dir() => {
                return Err(ConfigError::ReplicaNotDirectory { path: replica });
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&replica, err)),
        }

        self.source = source;
        self.replica = replica;
        Ok(self)
    }

    /// [`check`](Self::check), then create the replica if absent and
    /// canonicalize it.
    pub fn prepare(self) -> Result<Self, ConfigError> {
        let mut config = self.check()?;
        std::fs::create_dir_all(&config.replica).map_err(|e| io_err(&config.replica, e))?;
        config.replica =
            std::fs::canonicalize(&config.replica).map_err(|e| io_err(&config.replica, e))?;
        Ok(config)
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn absolute_from_existing_ancestor(path: &Path) -> Result<PathBuf, ConfigError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| io_err(path, e))?
            .join(path)
    };

    let mut missing = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        match std::fs::canonicalize(cursor) {
            Ok(mut resolved) => {
                for component in missing.iter().rev() {
                    resolved.push(component);
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (cursor.parent(), cursor.file_name()) else {
                    return Err(io_err(cursor, err));
                };
                missing.push(name.to_os_string());
                cursor = parent;
            }
            Err(err) => return Err(io_err(cursor, err)),
        }
    }
}

// ---------------------------------------------------------------------------
// 3. File layer
// ---------------------------------------------------------------------------

/// `<home>/.foldersync/` — pure, no I/O.
pub fn foldersync_root(home: &Path) -> PathBuf {
    home.join(".foldersync")
}

/// `<home>/.foldersync/config.yaml` — pure, no I/O.
pub fn default_config_path_at(home: &Path) -> PathBuf {
    foldersync_root(home).join("config.yaml")
}

/// `<home>/.foldersync/logs/sync.log` — pure, no I/O.
pub fn default_log_path_at(home: &Path) -> PathBuf {
    foldersync_root(home).join("logs").join("sync.log")
}

/// Load one YAML configuration layer from `path`.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed.
pub fn load_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(PartialConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `<home>/.foldersync/config.yaml`, or an empty layer if it is absent.
pub fn load_default_at(home: &Path) -> Result<PartialConfig, ConfigError> {
    let path = default_config_path_at(home);
    if !path.exists() {
        return Ok(PartialConfig::default());
    }
    load_file(&path)
}

/// `load_default_at` convenience wrapper.
pub fn load_default() -> Result<PartialConfig, ConfigError> {
    load_default_at(&home()?)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
