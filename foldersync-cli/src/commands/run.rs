//! `foldersync run` — foreground poll loop.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use foldersync_core::{config, ChangeDetection, PartialConfig};

use super::TreeArgs;

/// Arguments for `foldersync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub trees: TreeArgs,

    /// Seconds between passes (default 5).
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Log file, rotated at 10 MiB. Defaults to ~/.foldersync/logs/sync.log.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Diff and reconcile on every pass instead of only when a snapshot
    /// changed.
    #[arg(long)]
    pub always: bool,

    /// Ignore changes made directly to the replica until the source changes.
    #[arg(long)]
    pub no_replica_drift: bool,

    /// Re-hash every file on every pass.
    #[arg(long)]
    pub no_ledger: bool,

    /// Do not carry modification times over to copies.
    #[arg(long)]
    pub no_preserve_metadata: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let overrides = PartialConfig {
            interval_secs: self.interval,
            log_file: self.log_file.clone(),
            change_detection: self.always.then_some(ChangeDetection::Always),
            detect_replica_drift: self.no_replica_drift.then_some(false),
            use_ledger: self.no_ledger.then_some(false),
            preserve_metadata: self.no_preserve_metadata.then_some(false),
            json_logs: self.json_logs.then_some(true),
            ..PartialConfig::default()
        };
        let mut sync_config = self.trees.prepare(overrides)?;

        if sync_config.log_file.is_none() {
            let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
            sync_config.log_file = Some(config::default_log_path_at(&home));
        }

        foldersync_daemon::start_blocking(sync_config).context("sync loop failed")?;
        Ok(())
    }
}
