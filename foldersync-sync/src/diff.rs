//! Differ — source snapshot against the live replica tree.
//!
//! Two sweeps:
//! 1. Source snapshot in path order: missing directories become `CreateDir`,
//!    missing or differing files become `CopyFile`. A path whose kind differs
//!    between the trees becomes a delete followed by a create.
//! 2. Replica walk: entries with no source counterpart become `DeleteDir`
//!    (subtree not descended) or `DeleteFile`.
//!
//! When the caller already holds a fresh replica snapshot, replica file
//! fingerprints come from it instead of being rehashed.
//!
//! The returned list is unordered with respect to application; the
//! reconciler schedules it.

use std::collections::HashSet;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use foldersync_core::{Action, EntryKind, Snapshot, SnapshotEntry};

use crate::error::{io_err, walk_err, SyncError};
use crate::fingerprint::file_fingerprint;
use crate::observer::{SyncEvent, SyncObserver};
use crate::stop::StopSignal;

/// Compute the actions that make `replica_root` match `source`.
///
/// `source_root` is consulted live before scheduling a delete, so an entry
/// that exists in the source but was left out of the snapshot (unreadable)
/// never has its replica copy removed.
///
/// `replica` must have been taken from `replica_root` during the same pass.
pub fn plan(
    source: &Snapshot,
    replica: Option<&Snapshot>,
    source_root: &Path,
    replica_root: &Path,
    observer: &dyn SyncObserver,
    stop: &StopSignal,
) -> Result<Vec<Action>, SyncError> {
    let (mut actions, replaced) = plan_creates(
        source,
        replica,
        source_root,
        replica_root,
        observer,
        stop,
    )?;
    plan_deletes(
        source,
        source_root,
        replica_root,
        observer,
        stop,
        &replaced,
        &mut actions,
    )?;

    Ok(actions)
}

fn plan_creates(
    source: &Snapshot,
    replica: Option<&Snapshot>,
    source_root: &Path,
    replica_root: &Path,
    observer: &dyn SyncObserver,
    stop: &StopSignal,
) -> Result<(Vec<Action>, HashSet<PathBuf>), SyncError> {
    let mut actions = Vec::new();
    let mut replaced = HashSet::new();
    // Root of a directory that does not exist in the replica yet; everything
    // below it is missing too and needs no probing.
    let mut fresh_dir: Option<PathBuf> = None;

    for (rel, entry) in source.iter() {
        if stop.is_triggered() {
            return Err(SyncError::Interrupted);
        }

        if let Some(prefix) = &fresh_dir {
            if rel.starts_with(prefix) {
                actions.push(create_for(rel, entry));
                continue;
            }
            fresh_dir = None;
        }

        let target = replica_root.join(rel);
        let existing = match std::fs::symlink_metadata(&target) {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                let error = io_err(&target, err);
                observer.notify(SyncEvent::EntrySkipped {
                    path: &target,
                    error: &error,
                });
                continue;
            }
        };

        match (entry.kind, existing) {
            (EntryKind::Directory, None) => {
                actions.push(Action::CreateDir(rel.clone()));
                fresh_dir = Some(rel.clone());
            }
            (EntryKind::Directory, Some(meta)) if meta.is_dir() => {}
            (EntryKind::Directory, Some(_)) => {
                actions.push(Action::DeleteFile(rel.clone()));
                actions.push(Action::CreateDir(rel.clone()));
                replaced.insert(rel.clone());
                fresh_dir = Some(rel.clone());
            }
            (EntryKind::File, None) => actions.push(Action::CopyFile(rel.clone())),
            (EntryKind::File, Some(meta)) if meta.is_dir() => {
                actions.push(Action::DeleteDir(rel.clone()));
                actions.push(Action::CopyFile(rel.clone()));
                replaced.insert(rel.clone());
            }
            (EntryKind::File, Some(meta)) => {
                let known = replica.and_then(|snap| snap.get(rel));
                if file_differs(source_root, rel, entry, known, &target, &meta, observer) {
                    actions.push(Action::CopyFile(rel.clone()));
                }
            }
        }
    }
    Ok((actions, replaced))
}

fn plan_deletes(
    source: &Snapshot,
    source_root: &Path,
    replica_root: &Path,
    observer: &dyn SyncObserver,
    stop: &StopSignal,
    replaced: &HashSet<PathBuf>,
    actions: &mut Vec<Action>,
) -> Result<(), SyncError> {
    // A vanished replica root has nothing to delete; the creates rebuild it.
    if let Err(err) = std::fs::symlink_metadata(replica_root) {
        if err.kind() == ErrorKind::NotFound {
            return Ok(());
        }
    }

    let mut walker = WalkDir::new(replica_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        if stop.is_triggered() {
            return Err(SyncError::Interrupted);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(walk_err(replica_root, err)),
            Err(err) => {
                let error = walk_err(replica_root, err);
                observer.notify(SyncEvent::EntrySkipped {
                    path: error.path().unwrap_or(replica_root),
                    error: &error,
                });
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(replica_root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let is_dir = entry.file_type().is_dir();

        if replaced.contains(&rel) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if let Some(source_entry) = source.get(&rel) {
            let same_kind = (source_entry.kind == EntryKind::Directory) == is_dir;
            // A kind mismatch that the first sweep could not probe is left
            // alone until the next pass.
            if !same_kind && is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let source_path = source_root.join(&rel);
        match std::fs::symlink_metadata(&source_path) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if is_dir {
                    actions.push(Action::DeleteDir(rel));
                    walker.skip_current_dir();
                } else {
                    actions.push(Action::DeleteFile(rel));
                }
            }
            // Present in the source but missing from the snapshot: unreadable
            // or a non-regular entry. Keep the replica copy.
            Ok(_) => {}
            Err(err) => {
                let error = io_err(&source_path, err);
                observer.notify(SyncEvent::EntrySkipped {
                    path: &source_path,
                    error: &error,
                });
            }
        }
    }
    Ok(())
}

fn create_for(rel: &Path, entry: &SnapshotEntry) -> Action {
    match entry.kind {
        EntryKind::Directory => Action::CreateDir(rel.to_path_buf()),
        EntryKind::File => Action::CopyFile(rel.to_path_buf()),
    }
}

/// Whether the replica file at `target` must be overwritten. Anything that
/// is not a regular file, or cannot be read, is overwritten. `known` is the
/// replica snapshot's entry for the same path, if there is one.
fn file_differs(
    source_root: &Path,
    rel: &Path,
    entry: &SnapshotEntry,
    known: Option<&SnapshotEntry>,
    target: &Path,
    replica_meta: &Metadata,
    observer: &dyn SyncObserver,
) -> bool {
    if !replica_meta.is_file() {
        return true;
    }
    if let Ok(source_meta) = std::fs::metadata(source_root.join(rel)) {
        if source_meta.len() != replica_meta.len() {
            return true;
        }
    }
    if let Some(known) = known {
        if known.kind == EntryKind::File {
            return known.fingerprint != entry.fingerprint;
        }
    }
    match file_fingerprint(target) {
        Ok(fp) => fp != entry.fingerprint,
        Err(error) => {
            observer.notify(SyncEvent::EntrySkipped {
                path: target,
                error: &error,
            });
            true
        }
    }
}
