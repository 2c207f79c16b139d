//! foldersync core library — domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — fingerprints, snapshots, actions
//! - [`config`] — layered YAML + command-line configuration
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ChangeDetection, PartialConfig, SyncConfig, DEFAULT_INTERVAL_SECS};
pub use error::ConfigError;
pub use types::{Action, EntryKind, Fingerprint, Snapshot, SnapshotEntry, FINGERPRINT_LEN};
