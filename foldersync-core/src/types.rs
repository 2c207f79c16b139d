//! Domain types shared by the engine, the daemon and the CLI.
//!
//! All path fields use `PathBuf`. Paths stored in a [`Snapshot`] or an
//! [`Action`] are always relative to their tree root.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Length in bytes of a [`Fingerprint`] (SHA-256).
pub const FINGERPRINT_LEN: usize = 32;

/// Fixed-size content digest of a file, or aggregate digest of a directory
/// subtree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(12);
        s
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Kind of a tree entry. Symlinks and special files are never snapshotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "dir"),
        }
    }
}

/// A single snapshotted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub kind: EntryKind,
    pub fingerprint: Fingerprint,
}

/// Immutable mapping from relative path to [`SnapshotEntry`] for an entire
/// tree at one point in time.
///
/// Iteration is in component-wise path order, so a directory is always
/// visited immediately before its own descendants. Equality only considers
/// the entries, never the root the snapshot was taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, SnapshotEntry>,
}

impl Snapshot {
    pub fn from_entries(entries: BTreeMap<PathBuf, SnapshotEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, rel: &Path) -> Option<&SnapshotEntry> {
        self.entries.get(rel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn files(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.kind == EntryKind::File)
            .count()
    }

    pub fn directories(&self) -> usize {
        self.len() - self.files()
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One filesystem operation against the replica, addressed by relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "action", content = "path", rename_all = "snake_case")]
pub enum Action {
    CreateDir(PathBuf),
    CopyFile(PathBuf),
    DeleteFile(PathBuf),
    DeleteDir(PathBuf),
}

impl Action {
    pub fn path(&self) -> &Path {
        match self {
            Action::CreateDir(p)
            | Action::CopyFile(p)
            | Action::DeleteFile(p)
            | Action::DeleteDir(p) => p,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Action::DeleteFile(_) | Action::DeleteDir(_))
    }

    /// Short verb used in log lines and CLI output.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::CreateDir(_) => "create-dir",
            Action::CopyFile(_) => "copy-file",
            Action::DeleteFile(_) => "delete-file",
            Action::DeleteDir(_) => "delete-dir",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path().display())
    }
}
