//! Pass driver shared by the CLI and the daemon poll loop.
//!
//! A pass is: snapshot the source, decide whether anything changed, then
//! diff against the live replica and reconcile. The [`Synchronizer`] keeps
//! the previous pass's snapshots and the modification ledgers between
//! passes; none of it survives a restart.

use std::io::ErrorKind;
use std::sync::Arc;

use foldersync_core::{Action, ChangeDetection, Snapshot, SyncConfig};

use crate::diff;
use crate::error::{io_err, SyncError};
use crate::ledger::ModificationLedger;
use crate::observer::{SyncEvent, SyncObserver};
use crate::reconcile::{self, ReconcileOptions, Report};
use crate::snapshot;
use crate::stop::StopSignal;

/// What a pass ended up doing.
#[derive(Debug)]
pub enum PassOutcome {
    /// Snapshots matched the previous pass; nothing was diffed.
    NoActionNeeded,
    /// Diff and reconcile ran. The report may contain failures, or be marked
    /// interrupted.
    Reconciled(Report),
    /// The stop signal fired before reconciliation started.
    Interrupted,
}

/// Owns all cross-pass state for one source/replica pair.
pub struct Synchronizer {
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,
    stop: StopSignal,
    dry_run: bool,
    last_source: Option<Snapshot>,
    last_replica: Option<Snapshot>,
    source_ledger: ModificationLedger,
    replica_ledger: ModificationLedger,
}

impl Synchronizer {
    pub fn new(config: SyncConfig, observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            config,
            observer,
            stop: StopSignal::new(),
            dry_run: false,
            last_source: None,
            last_replica: None,
            source_ledger: ModificationLedger::new(),
            replica_ledger: ModificationLedger::new(),
        }
    }

    /// Share an externally owned stop signal.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Report actions instead of applying them. A dry-run pass never retains
    /// snapshots, so a later real pass still reconciles.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Source snapshot retained from the last clean pass.
    pub fn last_source_snapshot(&self) -> Option<&Snapshot> {
        self.last_source.as_ref()
    }

    /// Run one pass. Per-entry and per-action failures are absorbed into the
    /// report; only pass-level failures (an unreadable root, for instance)
    /// come back as `Err`, after retained state has been dropped.
    pub fn run_pass(&mut self) -> Result<PassOutcome, SyncError> {
        self.observer.notify(SyncEvent::PassStarted {
            source: &self.config.source,
            replica: &self.config.replica,
        });

        match self.pass() {
            Ok(outcome) => {
                let interrupted = match &outcome {
                    PassOutcome::Reconciled(report) => report.interrupted,
                    PassOutcome::Interrupted => true,
                    PassOutcome::NoActionNeeded => false,
                };
                if interrupted {
                    self.observer.notify(SyncEvent::PassInterrupted);
                }
                Ok(outcome)
            }
            Err(SyncError::Interrupted) => {
                self.forget();
                self.observer.notify(SyncEvent::PassInterrupted);
                Ok(PassOutcome::Interrupted)
            }
            Err(error) => {
                self.forget();
                self.observer.notify(SyncEvent::PassFailed { error: &error });
                Err(error)
            }
        }
    }

    /// Scheduled actions for the current state of both trees. Nothing is
    /// mutated and no state is retained.
    pub fn preview(&self) -> Result<Vec<Action>, SyncError> {
        let source = snapshot::take_with(
            &self.config.source,
            None,
            self.observer.as_ref(),
            &self.stop,
        )?;
        let actions = diff::plan(
            &source,
            None,
            &self.config.source,
            &self.config.replica,
            self.observer.as_ref(),
            &self.stop,
        )?;
        Ok(reconcile::schedule(actions))
    }

    fn pass(&mut self) -> Result<PassOutcome, SyncError> {
        let source = self.take_source()?;
        let replica = if self.config.detect_replica_drift {
            self.replica_snapshot()?
        } else {
            None
        };

        if self.config.change_detection == ChangeDetection::Snapshot {
            let source_changed = self.last_source.as_ref() != Some(&source);
            let replica_changed =
                self.config.detect_replica_drift && self.last_replica != replica;
            if !source_changed && !replica_changed {
                self.observer.notify(SyncEvent::NoActionNeeded);
                return Ok(PassOutcome::NoActionNeeded);
            }
        }

        if !self.dry_run {
            std::fs::create_dir_all(&self.config.replica)
                .map_err(|e| io_err(&self.config.replica, e))?;
        }

        let actions = diff::plan(
            &source,
            replica.as_ref(),
            &self.config.source,
            &self.config.replica,
            self.observer.as_ref(),
            &self.stop,
        )?;
        let options = ReconcileOptions {
            preserve_metadata: self.config.preserve_metadata,
            dry_run: self.dry_run,
        };
        let report = reconcile::apply(
            &self.config.source,
            &self.config.replica,
            actions,
            options,
            self.observer.as_ref(),
            &self.stop,
        );
        self.observer.notify(SyncEvent::PassCompleted { report: &report });

        // Failed or skipped work must be re-diffed next pass, so only a clean
        // pass is remembered.
        if report.is_clean() && !report.dry_run {
            self.last_replica = if self.config.detect_replica_drift {
                self.replica_snapshot()?
            } else {
                None
            };
            self.last_source = Some(source);
        } else {
            self.forget();
        }

        Ok(PassOutcome::Reconciled(report))
    }

    fn take_source(&mut self) -> Result<Snapshot, SyncError> {
        let ledger = self.config.use_ledger.then_some(&mut self.source_ledger);
        snapshot::take_with(
            &self.config.source,
            ledger,
            self.observer.as_ref(),
            &self.stop,
        )
    }

    /// `None` when the replica root does not exist (removed from outside).
    fn replica_snapshot(&mut self) -> Result<Option<Snapshot>, SyncError> {
        match std::fs::symlink_metadata(&self.config.replica) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            _ => self.take_replica().map(Some),
        }
    }

    fn take_replica(&mut self) -> Result<Snapshot, SyncError> {
        let ledger = self.config.use_ledger.then_some(&mut self.replica_ledger);
        snapshot::take_with(
            &self.config.replica,
            ledger,
            self.observer.as_ref(),
            &self.stop,
        )
    }

    fn forget(&mut self) {
        self.last_source = None;
        self.last_replica = None;
    }
}
