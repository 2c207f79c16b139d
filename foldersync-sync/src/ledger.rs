//! Modification ledger — skips re-hashing files whose metadata is unchanged.
//!
//! One ledger per tree, owned by the [`Synchronizer`](crate::Synchronizer)
//! and updated in place each pass. Nothing is persisted; a restart starts
//! from an empty ledger.
//!
//! An entry is trusted only when the file's mtime and length match the
//! recorded stamp and the mtime was at least [`RACY_WINDOW`] older than the
//! moment the entry was recorded. A write landing inside the filesystem's
//! timestamp granularity could otherwise keep the old mtime and go unseen.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use foldersync_core::Fingerprint;

/// Minimum age of an mtime, relative to its observation, before the ledger
/// trusts it.
pub const RACY_WINDOW: Duration = Duration::from_secs(2);

/// The metadata the ledger keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

impl FileStamp {
    /// `None` when the platform does not report modification times.
    pub fn from_metadata(meta: &Metadata) -> Option<Self> {
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    stamp: FileStamp,
    fingerprint: Fingerprint,
    observed_at: SystemTime,
}

impl LedgerEntry {
    fn is_racy(&self) -> bool {
        match self.observed_at.duration_since(self.stamp.modified) {
            Ok(age) => age < RACY_WINDOW,
            // mtime in the future relative to observation.
            Err(_) => true,
        }
    }
}

/// Relative path → last observed stamp and fingerprint.
#[derive(Debug, Default)]
pub struct ModificationLedger {
    entries: HashMap<PathBuf, LedgerEntry>,
}

impl ModificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached fingerprint for `rel`, if the entry can be trusted for `stamp`.
    pub fn lookup(&self, rel: &Path, stamp: &FileStamp) -> Option<Fingerprint> {
        let entry = self.entries.get(rel)?;
        if entry.stamp != *stamp || entry.is_racy() {
            return None;
        }
        Some(entry.fingerprint)
    }

    /// Record a freshly computed fingerprint, observed now.
    pub fn record(&mut self, rel: PathBuf, stamp: FileStamp, fingerprint: Fingerprint) {
        self.record_at(rel, stamp, fingerprint, SystemTime::now());
    }

    pub fn record_at(
        &mut self,
        rel: PathBuf,
        stamp: FileStamp,
        fingerprint: Fingerprint,
        observed_at: SystemTime,
    ) {
        self.entries.insert(
            rel,
            LedgerEntry {
                stamp,
                fingerprint,
                observed_at,
            },
        );
    }

    /// Drop entries for paths no longer present in the tree.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
