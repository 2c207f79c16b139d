//! `foldersync snapshot <path>` — fingerprint every entry under a directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use foldersync_core::EntryKind;
use foldersync_sync::{snapshot, NoopObserver};

/// Arguments for `foldersync snapshot`.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Directory to walk.
    pub path: PathBuf,

    /// Print `{ "rel/path": { "kind": ..., "fingerprint": ... } }` JSON.
    #[arg(long)]
    pub json: bool,
}

impl SnapshotArgs {
    pub fn run(self) -> Result<()> {
        let snap = snapshot::take(&self.path, &NoopObserver)
            .with_context(|| format!("failed to snapshot {}", self.path.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&snap)?);
            return Ok(());
        }

        for (rel, entry) in snap.iter() {
            let suffix = match entry.kind {
                EntryKind::Directory => "/",
                EntryKind::File => "",
            };
            println!("{}  {}{}", entry.fingerprint.short(), rel.display(), suffix);
        }
        println!("{} files, {} directories", snap.files(), snap.directories());
        Ok(())
    }
}
