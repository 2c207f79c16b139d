//! # foldersync-sync
//!
//! Fingerprinting, tree snapshots, diffing and reconciliation.
//!
//! [`Synchronizer::run_pass`] runs one full pass; the daemon calls it on a
//! timer, the CLI calls it once.

pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod observer;
pub mod pipeline;
pub mod reconcile;
pub mod snapshot;
pub mod stop;

pub use error::SyncError;
pub use ledger::ModificationLedger;
pub use observer::{NoopObserver, SyncEvent, SyncObserver, TracingObserver};
pub use pipeline::{PassOutcome, Synchronizer};
pub use reconcile::{
    ActionResult, ActionStatus, FailureSummary, ReconcileOptions, Report, ReportSummary,
};
pub use stop::StopSignal;
