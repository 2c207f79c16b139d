//! Content fingerprints for files and directory subtrees.
//!
//! A file fingerprint is the SHA-256 of its bytes, streamed in
//! [`CHUNK_SIZE`] chunks. Metadata never contributes, so identical content
//! always yields the identical fingerprint.
//!
//! A directory fingerprint hashes every descendant sorted by relative path:
//!
//! ```text
//! file:      "f" || relpath || 0x00 || file fingerprint
//! directory: "d" || relpath || 0x00
//! ```
//!
//! Relative paths are joined with `/` regardless of platform.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use foldersync_core::{EntryKind, Fingerprint};

use crate::error::{io_err, walk_err, SyncError};

/// Read size used when streaming a file into the hasher.
pub const CHUNK_SIZE: usize = 4096;

/// Fingerprint the bytes of the file at `path`.
pub fn file_fingerprint(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_err(path, err)),
        }
    }
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Fingerprint every entry strictly inside the directory at `path`.
///
/// Fails on the first unreadable entry. Symlinks are not followed and do not
/// contribute.
pub fn directory_fingerprint(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut entries: BTreeMap<PathBuf, (EntryKind, Option<Fingerprint>)> = BTreeMap::new();

    let walker = WalkDir::new(path).min_depth(1).follow_links(false);
    for entry in walker {
        let entry = entry.map_err(|e| walk_err(path, e))?;
        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_path_buf();
        let file_type = entry.file_type();
        if file_type.is_dir() {
            entries.insert(rel, (EntryKind::Directory, None));
        } else if file_type.is_file() {
            let fingerprint = file_fingerprint(entry.path())?;
            entries.insert(rel, (EntryKind::File, Some(fingerprint)));
        }
    }

    Ok(aggregate(
        entries
            .iter()
            .map(|(rel, (kind, fp))| (rel.as_path(), *kind, fp.as_ref())),
    ))
}

/// Combine already-fingerprinted descendants into a directory fingerprint.
///
/// `children` must be sorted by relative path. The fingerprint of a
/// directory child is ignored; its own descendants are expected in the
/// stream.
pub(crate) fn aggregate<'a, I>(children: I) -> Fingerprint
where
    I: IntoIterator<Item = (&'a Path, EntryKind, Option<&'a Fingerprint>)>,
{
    let mut hasher = Sha256::new();
    for (rel, kind, fingerprint) in children {
        match kind {
            EntryKind::File => hasher.update(b"f"),
            EntryKind::Directory => hasher.update(b"d"),
        }
        hasher.update(portable_path(rel).as_bytes());
        hasher.update([0u8]);
        if let (EntryKind::File, Some(fp)) = (kind, fingerprint) {
            hasher.update(fp.as_bytes());
        }
    }
    Fingerprint(hasher.finalize().into())
}

fn portable_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
