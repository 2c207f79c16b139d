//! Observer interface for sync progress.
//!
//! The engine never logs through a global handle on its own; every event is
//! delivered to the [`SyncObserver`] the caller passed in. [`TracingObserver`]
//! is the stock implementation and forwards events to `tracing` with
//! structured fields.

use std::path::Path;

use foldersync_core::Action;

use crate::error::SyncError;
use crate::reconcile::Report;

/// Everything the engine reports while running a pass.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    /// A pass is starting.
    PassStarted { source: &'a Path, replica: &'a Path },
    /// Nothing changed since the previous pass; diff and reconcile skipped.
    NoActionNeeded,
    /// An action was applied to the replica. `replaced` is set when a copy
    /// overwrote an existing file.
    ActionApplied { action: &'a Action, replaced: bool },
    /// Dry-run: the action would have been applied.
    ActionPlanned { action: &'a Action },
    /// Applying an action failed; the pass continues with the next one.
    ActionFailed {
        action: &'a Action,
        error: &'a SyncError,
    },
    /// An entry could not be read while walking a tree and was left out.
    EntrySkipped { path: &'a Path, error: &'a SyncError },
    /// A symlink or special file was ignored.
    EntryIgnored { path: &'a Path },
    /// A reconcile step finished (possibly with failures).
    PassCompleted { report: &'a Report },
    /// The pass aborted with an unexpected error.
    PassFailed { error: &'a SyncError },
    /// The stop signal fired mid-pass.
    PassInterrupted,
}

/// Receives [`SyncEvent`]s. Implementations must be cheap and must not panic.
pub trait SyncObserver: Send + Sync {
    fn notify(&self, event: SyncEvent<'_>);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn notify(&self, event: SyncEvent<'_>) {
        match event {
            SyncEvent::PassStarted { source, replica } => tracing::info!(
                source = %source.display(),
                replica = %replica.display(),
                "syncing files",
            ),
            SyncEvent::NoActionNeeded => tracing::info!("no action needed"),
            SyncEvent::ActionApplied { action, replaced } => match action {
                Action::CreateDir(path) => {
                    tracing::info!(path = %path.display(), "created directory")
                }
                Action::CopyFile(path) if replaced => {
                    tracing::info!(path = %path.display(), "updated file")
                }
                Action::CopyFile(path) => tracing::info!(path = %path.display(), "created file"),
                Action::DeleteFile(path) => tracing::info!(path = %path.display(), "deleted file"),
                Action::DeleteDir(path) => {
                    tracing::info!(path = %path.display(), "deleted directory")
                }
            },
            SyncEvent::ActionPlanned { action } => tracing::info!(
                action = action.verb(),
                path = %action.path().display(),
                "[dry-run] would apply",
            ),
            SyncEvent::ActionFailed { action, error } => tracing::error!(
                action = action.verb(),
                path = %action.path().display(),
                error = %error,
                "action failed",
            ),
            SyncEvent::EntrySkipped { path, error } => tracing::warn!(
                path = %path.display(),
                error = %error,
                "skipping unreadable entry",
            ),
            SyncEvent::EntryIgnored { path } => {
                tracing::debug!(path = %path.display(), "ignoring non-regular entry")
            }
            SyncEvent::PassCompleted { report } => {
                let summary = report.summary();
                if summary.failed > 0 {
                    tracing::warn!(
                        applied = summary.applied,
                        failed = summary.failed,
                        duration_ms = summary.duration_ms,
                        "sync pass finished with failures",
                    );
                } else {
                    tracing::info!(
                        applied = summary.applied,
                        planned = summary.planned,
                        duration_ms = summary.duration_ms,
                        "sync pass finished",
                    );
                }
            }
            SyncEvent::PassFailed { error } => {
                tracing::error!(error = %error, "sync pass failed")
            }
            SyncEvent::PassInterrupted => tracing::info!("sync pass interrupted"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn notify(&self, _event: SyncEvent<'_>) {}
}
