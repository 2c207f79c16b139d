//! Tree snapshots: relative path → fingerprint for every file and directory
//! under a root.
//!
//! The walk is depth-first in file-name order. A single unreadable entry is
//! reported to the observer and left out; it never aborts the walk. The root
//! itself being unreadable is an error, because an empty snapshot would read
//! as "everything was deleted".

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use foldersync_core::{EntryKind, Fingerprint, Snapshot, SnapshotEntry};

use crate::error::{io_err, walk_err, SyncError};
use crate::fingerprint::{aggregate, file_fingerprint};
use crate::ledger::{FileStamp, ModificationLedger};
use crate::observer::{SyncEvent, SyncObserver};
use crate::stop::StopSignal;

#[derive(Debug, Clone, Copy)]
enum Walked {
    File(Fingerprint),
    Directory,
}

impl Walked {
    fn kind(&self) -> EntryKind {
        match self {
            Walked::File(_) => EntryKind::File,
            Walked::Directory => EntryKind::Directory,
        }
    }

    fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Walked::File(fp) => Some(fp),
            Walked::Directory => None,
        }
    }
}

/// Snapshot `root` without a ledger.
pub fn take(root: &Path, observer: &dyn SyncObserver) -> Result<Snapshot, SyncError> {
    take_with(root, None, observer, &StopSignal::new())
}

/// Snapshot `root`, reusing fingerprints from `ledger` where it can be
/// trusted and recording every freshly hashed file back into it.
///
/// Returns [`SyncError::Interrupted`] if `stop` fires mid-walk; the ledger
/// is left as-is in that case.
pub fn take_with(
    root: &Path,
    mut ledger: Option<&mut ModificationLedger>,
    observer: &dyn SyncObserver,
    stop: &StopSignal,
) -> Result<Snapshot, SyncError> {
    let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if !meta.is_dir() {
        return Err(io_err(root, std::io::Error::other("not a directory")));
    }

    let mut walked: BTreeMap<PathBuf, Walked> = BTreeMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        if stop.is_triggered() {
            return Err(SyncError::Interrupted);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(walk_err(root, err)),
            Err(err) => {
                let error = walk_err(root, err);
                observer.notify(SyncEvent::EntrySkipped {
                    path: error.path().unwrap_or(root),
                    error: &error,
                });
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            walked.insert(rel, Walked::Directory);
        } else if file_type.is_file() {
            match fingerprint_entry(&entry, &rel, ledger.as_deref_mut()) {
                Ok(fp) => {
                    walked.insert(rel, Walked::File(fp));
                }
                Err(error) => observer.notify(SyncEvent::EntrySkipped {
                    path: entry.path(),
                    error: &error,
                }),
            }
        } else {
            observer.notify(SyncEvent::EntryIgnored { path: entry.path() });
        }
    }

    if let Some(ledger) = ledger {
        ledger.retain(|p| matches!(walked.get(p), Some(Walked::File(_))));
    }

    Ok(Snapshot::from_entries(resolve_directories(&walked)))
}

fn fingerprint_entry(
    entry: &walkdir::DirEntry,
    rel: &Path,
    ledger: Option<&mut ModificationLedger>,
) -> Result<Fingerprint, SyncError> {
    let Some(ledger) = ledger else {
        return file_fingerprint(entry.path());
    };

    let stamp = entry
        .metadata()
        .ok()
        .and_then(|meta| FileStamp::from_metadata(&meta));
    let Some(stamp) = stamp else {
        return file_fingerprint(entry.path());
    };

    if let Some(cached) = ledger.lookup(rel, &stamp) {
        return Ok(cached);
    }
    let fp = file_fingerprint(entry.path())?;
    ledger.record(rel.to_path_buf(), stamp, fp);
    Ok(fp)
}

/// Give every directory its aggregate fingerprint. Descendants of `dir` are
/// exactly the keys that follow it in component order and start with it.
fn resolve_directories(walked: &BTreeMap<PathBuf, Walked>) -> BTreeMap<PathBuf, SnapshotEntry> {
    walked
        .iter()
        .map(|(rel, item)| {
            let fingerprint = match item {
                Walked::File(fp) => *fp,
                Walked::Directory => {
                    let descendants = walked
                        .range::<Path, _>((Bound::Excluded(rel.as_path()), Bound::Unbounded))
                        .take_while(|(path, _)| path.starts_with(rel))
                        .map(|(path, child)| {
                            (
                                path.strip_prefix(rel).unwrap_or(path.as_path()),
                                child.kind(),
                                child.fingerprint(),
                            )
                        });
                    aggregate(descendants)
                }
            };
            (
                rel.clone(),
                SnapshotEntry {
                    kind: item.kind(),
                    fingerprint,
                },
            )
        })
        .collect()
}
