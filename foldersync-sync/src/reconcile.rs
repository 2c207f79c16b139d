//! Reconciler — schedules and applies actions to the replica.
//!
//! ## Schedule
//!
//! 1. Deletes that clear the way for a create at the same path (or above it).
//! 2. `CreateDir`, parents first.
//! 3. `CopyFile`.
//! 4. All remaining deletes.
//!
//! ## `copy_file` — atomic protocol
//!
//! 1. Ensure the parent directory exists.
//! 2. Copy the source bytes and permissions into a freshly created, uniquely
//!    named `.foldersync-*.tmp` file in the same directory. Creation is
//!    exclusive, so no existing replica entry is ever reused as scratch.
//! 3. Carry over mtime/atime when metadata preservation is on.
//! 4. Rename over the final path (atomic on POSIX).
//! 5. On any failure the temp file is removed; the original stays intact.
//!
//! Every action is isolated: a failure is recorded in the [`Report`] and the
//! next action runs. There is no rollback.

use std::collections::HashSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::Serialize;
use tempfile::NamedTempFile;

use foldersync_core::Action;

use crate::error::{io_err, SyncError};
use crate::observer::{SyncEvent, SyncObserver};
use crate::stop::StopSignal;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of a single action.
#[derive(Debug)]
pub enum ActionStatus {
    /// Applied. `replaced` is set when a copy overwrote an existing file.
    Applied { replaced: bool },
    /// Dry-run: nothing was touched.
    Planned,
    Failed(SyncError),
}

#[derive(Debug)]
pub struct ActionResult {
    pub action: Action,
    pub status: ActionStatus,
}

/// Everything one reconcile step did.
#[derive(Debug)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub dry_run: bool,
    /// The stop signal fired; remaining actions were not attempted.
    pub interrupted: bool,
    pub results: Vec<ActionResult>,
}

/// Counts derived from a [`Report`], suitable for JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub dry_run: bool,
    pub interrupted: bool,
    pub applied: usize,
    pub planned: usize,
    pub failed: usize,
    pub dirs_created: usize,
    pub files_created: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub action: &'static str,
    pub path: PathBuf,
    pub error: String,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = (&Action, &SyncError)> {
        self.results.iter().filter_map(|r| match &r.status {
            ActionStatus::Failed(err) => Some((&r.action, err)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// No failures and not interrupted.
    pub fn is_clean(&self) -> bool {
        !self.interrupted && !self.has_failures()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            started_at: self.started_at,
            duration_ms: self.duration.as_millis(),
            dry_run: self.dry_run,
            interrupted: self.interrupted,
            applied: 0,
            planned: 0,
            failed: 0,
            dirs_created: 0,
            files_created: 0,
            files_updated: 0,
            files_deleted: 0,
            dirs_deleted: 0,
            failures: Vec::new(),
        };

        for result in &self.results {
            match &result.status {
                ActionStatus::Applied { replaced } => {
                    summary.applied += 1;
                    match result.action {
                        Action::CreateDir(_) => summary.dirs_created += 1,
                        Action::CopyFile(_) if *replaced => summary.files_updated += 1,
                        Action::CopyFile(_) => summary.files_created += 1,
                        Action::DeleteFile(_) => summary.files_deleted += 1,
                        Action::DeleteDir(_) => summary.dirs_deleted += 1,
                    }
                }
                ActionStatus::Planned => summary.planned += 1,
                ActionStatus::Failed(err) => {
                    summary.failed += 1;
                    summary.failures.push(FailureSummary {
                        action: result.action.verb(),
                        path: result.action.path().to_path_buf(),
                        error: err.to_string(),
                    });
                }
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Carry source mtime/atime over to copies.
    pub preserve_metadata: bool,
    /// Report what would be done without mutating the replica.
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            preserve_metadata: true,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// schedule
// ---------------------------------------------------------------------------

/// Order actions so copies never target a missing parent and type
/// replacements clear the path before recreating it.
pub fn schedule(actions: Vec<Action>) -> Vec<Action> {
    // Every create target plus its ancestors: a delete of any of these
    // paths obstructs a create.
    let blocked: HashSet<PathBuf> = actions
        .iter()
        .filter(|a| !a.is_delete())
        .flat_map(|a| a.path().ancestors())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();

    let mut obstructing = Vec::new();
    let mut dirs = Vec::new();
    let mut copies = Vec::new();
    let mut deletes = Vec::new();

    for action in actions {
        match action {
            Action::CreateDir(_) => dirs.push(action),
            Action::CopyFile(_) => copies.push(action),
            Action::DeleteFile(_) | Action::DeleteDir(_) => {
                let path = action.path();
                if blocked.contains(path) {
                    obstructing.push(action);
                } else {
                    deletes.push(action);
                }
            }
        }
    }

    for group in [&mut obstructing, &mut dirs, &mut copies, &mut deletes] {
        group.sort_by(|a, b| a.path().cmp(b.path()));
    }

    obstructing
        .into_iter()
        .chain(dirs)
        .chain(copies)
        .chain(deletes)
        .collect()
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Schedule and apply `actions` to `replica_root`, copying from
/// `source_root`.
pub fn apply(
    source_root: &Path,
    replica_root: &Path,
    actions: Vec<Action>,
    options: ReconcileOptions,
    observer: &dyn SyncObserver,
    stop: &StopSignal,
) -> Report {
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut results = Vec::with_capacity(actions.len());
    let mut interrupted = false;

    for action in schedule(actions) {
        if stop.is_triggered() {
            interrupted = true;
            break;
        }

        let status = if options.dry_run {
            observer.notify(SyncEvent::ActionPlanned { action: &action });
            ActionStatus::Planned
        } else {
            match apply_one(source_root, replica_root, &action, options) {
                Ok(replaced) => {
                    observer.notify(SyncEvent::ActionApplied {
                        action: &action,
                        replaced,
                    });
                    ActionStatus::Applied { replaced }
                }
                Err(error) => {
                    observer.notify(SyncEvent::ActionFailed {
                        action: &action,
                        error: &error,
                    });
                    ActionStatus::Failed(error)
                }
            }
        };
        results.push(ActionResult { action, status });
    }

    Report {
        started_at,
        duration: clock.elapsed(),
        dry_run: options.dry_run,
        interrupted,
        results,
    }
}

/// Returns whether an existing file was replaced (copies only).
fn apply_one(
    source_root: &Path,
    replica_root: &Path,
    action: &Action,
    options: ReconcileOptions,
) -> Result<bool, SyncError> {
    let target = replica_root.join(action.path());
    match action {
        Action::CreateDir(_) => {
            std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            Ok(false)
        }
        Action::CopyFile(rel) => copy_file(
            &source_root.join(rel),
            &target,
            options.preserve_metadata,
        ),
        Action::DeleteFile(_) => {
            ignore_not_found(std::fs::remove_file(&target)).map_err(|e| io_err(&target, e))?;
            Ok(false)
        }
        Action::DeleteDir(_) => {
            ignore_not_found(std::fs::remove_dir_all(&target))
                .map_err(|e| io_err(&target, e))?;
            Ok(false)
        }
    }
}

/// A delete that finds nothing has already converged.
fn ignore_not_found(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Prefix of in-flight copy files inside the replica.
pub(crate) const TEMP_PREFIX: &str = ".foldersync-";

fn copy_file(source: &Path, target: &Path, preserve_metadata: bool) -> Result<bool, SyncError> {
    // Step 1: ensure parent directory exists.
    let parent = match target.parent() {
        Some(parent) => parent,
        None => return Err(io_err(target, ErrorKind::InvalidInput.into())),
    };
    std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    let replaced = std::fs::symlink_metadata(target).is_ok();

    // Step 2: copy bytes and permissions. Dropping `tmp` on any early
    // return deletes it.
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| io_err(parent, e))?;
    let mut reader = File::open(source).map_err(|e| io_err(source, e))?;
    std::io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| io_err(source, e))?;
    let meta = reader.metadata().map_err(|e| io_err(source, e))?;
    tmp.as_file()
        .set_permissions(meta.permissions())
        .map_err(|e| io_err(tmp.path(), e))?;

    // Step 3: timestamps.
    if preserve_metadata {
        carry_timestamps(&meta, &tmp)?;
    }

    // Step 4: atomic rename to final path.
    persist(tmp, target)?;
    Ok(replaced)
}

/// The temp file is deleted when the rename fails.
fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), SyncError> {
    tmp.persist(target)
        .map(|_| ())
        .map_err(|err| io_err(target, err.error))
}

fn carry_timestamps(meta: &std::fs::Metadata, dest: &NamedTempFile) -> Result<(), SyncError> {
    let mtime = FileTime::from_last_modification_time(meta);
    let atime = FileTime::from_last_access_time(meta);
    filetime::set_file_handle_times(dest.as_file(), Some(atime), Some(mtime))
        .map_err(|e| io_err(dest.path(), e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    use crate::observer::NoopObserver;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn leftover_temps(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    fn run(source: &Path, replica: &Path, actions: Vec<Action>) -> Report {
        apply(
            source,
            replica,
            actions,
            ReconcileOptions::default(),
            &NoopObserver,
            &StopSignal::new(),
        )
    }

    #[test]
    fn schedule_puts_dirs_before_copies_before_deletes() {
        let scheduled = schedule(vec![
            Action::DeleteFile(p("old.txt")),
            Action::CopyFile(p("a/b/c.txt")),
            Action::CreateDir(p("a/b")),
            Action::DeleteDir(p("gone")),
            Action::CreateDir(p("a")),
        ]);
        assert_eq!(
            scheduled,
            vec![
                Action::CreateDir(p("a")),
                Action::CreateDir(p("a/b")),
                Action::CopyFile(p("a/b/c.txt")),
                Action::DeleteDir(p("gone")),
                Action::DeleteFile(p("old.txt")),
            ]
        );
    }

    #[test]
    fn schedule_runs_obstructing_deletes_first() {
        let scheduled = schedule(vec![
            Action::CreateDir(p("x")),
            Action::CopyFile(p("x/in.txt")),
            Action::DeleteFile(p("x")),
            Action::DeleteFile(p("unrelated")),
        ]);
        assert_eq!(
            scheduled,
            vec![
                Action::DeleteFile(p("x")),
                Action::CreateDir(p("x")),
                Action::CopyFile(p("x/in.txt")),
                Action::DeleteFile(p("unrelated")),
            ]
        );
    }

    #[test]
    fn schedule_treats_only_ancestors_of_creates_as_obstructing() {
        let scheduled = schedule(vec![
            Action::CopyFile(p("x/y/z.txt")),
            Action::DeleteFile(p("x/y/sibling")),
            Action::DeleteFile(p("x")),
            Action::DeleteDir(p("x/y/z.txt")),
        ]);
        assert_eq!(
            scheduled,
            vec![
                Action::DeleteFile(p("x")),
                Action::DeleteDir(p("x/y/z.txt")),
                Action::CopyFile(p("x/y/z.txt")),
                Action::DeleteFile(p("x/y/sibling")),
            ]
        );
    }

    #[test]
    fn copy_reports_created_then_replaced() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("f.txt"), "v1").unwrap();

        let first = run(src.path(), dst.path(), vec![Action::CopyFile(p("f.txt"))]);
        assert!(matches!(
            first.results[0].status,
            ActionStatus::Applied { replaced: false }
        ));

        fs::write(src.path().join("f.txt"), "v2").unwrap();
        let second = run(src.path(), dst.path(), vec![Action::CopyFile(p("f.txt"))]);
        assert!(matches!(
            second.results[0].status,
            ActionStatus::Applied { replaced: true }
        ));
        assert_eq!(fs::read_to_string(dst.path().join("f.txt")).unwrap(), "v2");
        assert!(leftover_temps(dst.path()).is_empty());
    }

    #[test]
    fn copies_never_clobber_dot_prefixed_siblings() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a"), "payload").unwrap();
        fs::write(src.path().join(".a.foldersync.tmp"), "sibling").unwrap();
        fs::write(src.path().join(".foldersync-x.tmp"), "lookalike").unwrap();

        let report = run(
            src.path(),
            dst.path(),
            vec![
                Action::CopyFile(p(".a.foldersync.tmp")),
                Action::CopyFile(p(".foldersync-x.tmp")),
                Action::CopyFile(p("a")),
            ],
        );
        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(dst.path().join("a")).unwrap(), "payload");
        assert_eq!(
            fs::read_to_string(dst.path().join(".a.foldersync.tmp")).unwrap(),
            "sibling"
        );
        assert_eq!(
            fs::read_to_string(dst.path().join(".foldersync-x.tmp")).unwrap(),
            "lookalike"
        );
        assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 3);
    }

    #[test]
    fn copy_preserves_mtime() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let source_file = src.path().join("f.txt");
        fs::write(&source_file, "data").unwrap();
        let stamp = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&source_file, stamp).unwrap();

        run(src.path(), dst.path(), vec![Action::CopyFile(p("f.txt"))]);
        let meta = fs::metadata(dst.path().join("f.txt")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), stamp);
    }

    #[test]
    fn failure_is_isolated_and_reported() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("ok.txt"), "ok").unwrap();

        let report = run(
            src.path(),
            dst.path(),
            vec![
                Action::CopyFile(p("missing.txt")),
                Action::CopyFile(p("ok.txt")),
            ],
        );
        assert_eq!(report.results.len(), 2);
        let summary = report.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.applied, 1);
        assert!(summary.failures[0].error.contains("missing.txt"));
        assert!(dst.path().join("ok.txt").exists());
        assert!(leftover_temps(dst.path()).is_empty());
    }

    #[test]
    fn deleting_absent_entries_counts_as_applied() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let report = run(
            src.path(),
            dst.path(),
            vec![Action::DeleteFile(p("nope")), Action::DeleteDir(p("nada"))],
        );
        assert!(report.is_clean());
        assert_eq!(report.summary().applied, 2);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("f.txt"), "x").unwrap();
        fs::write(dst.path().join("stale.txt"), "x").unwrap();

        let report = apply(
            src.path(),
            dst.path(),
            vec![
                Action::CopyFile(p("f.txt")),
                Action::DeleteFile(p("stale.txt")),
            ],
            ReconcileOptions {
                dry_run: true,
                ..Default::default()
            },
            &NoopObserver,
            &StopSignal::new(),
        );
        assert_eq!(report.summary().planned, 2);
        assert!(!dst.path().join("f.txt").exists());
        assert!(dst.path().join("stale.txt").exists());
    }

    #[test]
    fn stop_signal_marks_report_interrupted() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let stop = StopSignal::new();
        stop.trigger();
        let report = apply(
            src.path(),
            dst.path(),
            vec![Action::CreateDir(p("a"))],
            ReconcileOptions::default(),
            &NoopObserver,
            &stop,
        );
        assert!(report.interrupted);
        assert!(report.results.is_empty());
        assert!(!dst.path().join("a").exists());
    }

    #[test]
    #[cfg(unix)]
    fn rename_onto_directory_fails_and_removes_temp() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("x"), "file").unwrap();
        fs::create_dir_all(dst.path().join("x").join("inner")).unwrap();

        let result = copy_file(&src.path().join("x"), &dst.path().join("x"), true);

        assert!(result.is_err());
        assert!(dst.path().join("x").join("inner").is_dir());
        assert!(leftover_temps(dst.path()).is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let source = root.path().join("source.txt");
        fs::write(&source, "new content").unwrap();

        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();
        let target = readonly_dir.join("file.md");
        fs::write(&target, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let result = copy_file(&source, &target, true);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root ignores directory permissions; only assert when the rename
        // was actually refused.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&target).unwrap(), "original");
            assert!(leftover_temps(&readonly_dir).is_empty(), "temp file should be cleaned up");
        }
    }
}
