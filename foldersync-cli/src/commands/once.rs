//! `foldersync once` — a single pass, then exit.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use foldersync_core::PartialConfig;
use foldersync_sync::{NoopObserver, PassOutcome, SyncObserver, Synchronizer, TracingObserver};

use super::TreeArgs;

/// Arguments for `foldersync once`.
#[derive(Args, Debug)]
pub struct OnceArgs {
    #[command(flatten)]
    pub trees: TreeArgs,

    /// Report what would change without touching the replica.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the pass summary as JSON instead of log lines.
    #[arg(long)]
    pub json: bool,

    /// Do not carry modification times over to copies.
    #[arg(long)]
    pub no_preserve_metadata: bool,
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        let overrides = PartialConfig {
            preserve_metadata: self.no_preserve_metadata.then_some(false),
            ..PartialConfig::default()
        };
        // A dry run must not even create the replica.
        let config = if self.dry_run {
            self.trees.check(overrides)?
        } else {
            self.trees.prepare(overrides)?
        };

        let observer: Arc<dyn SyncObserver> = if self.json {
            Arc::new(NoopObserver)
        } else {
            foldersync_daemon::init_tracing(config.log_file.as_deref(), config.json_logs)?;
            Arc::new(TracingObserver)
        };

        let mut synchronizer = Synchronizer::new(config, observer).with_dry_run(self.dry_run);
        let report = match synchronizer.run_pass().context("sync pass failed")? {
            PassOutcome::Reconciled(report) => report,
            PassOutcome::NoActionNeeded => {
                println!("no action needed");
                return Ok(());
            }
            PassOutcome::Interrupted => bail!("sync pass interrupted"),
        };
        let summary = report.summary();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else if self.dry_run {
            println!("[dry-run] {} action(s) planned", summary.planned);
        } else if summary.failed == 0 {
            println!(
                "{} {} applied ({} created, {} updated, {} deleted) in {} ms",
                "✓".green().bold(),
                summary.applied,
                summary.files_created + summary.dirs_created,
                summary.files_updated,
                summary.files_deleted + summary.dirs_deleted,
                summary.duration_ms,
            );
        } else {
            println!(
                "{} {} applied, {} failed",
                "✗".red().bold(),
                summary.applied,
                summary.failed
            );
            for failure in &summary.failures {
                println!("  {} {}: {}", failure.action, failure.path.display(), failure.error);
            }
        }

        if summary.failed > 0 {
            bail!("{} action(s) failed", summary.failed);
        }
        Ok(())
    }
}
