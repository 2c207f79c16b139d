//! `foldersync diff` — scheduled actions, nothing applied.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use foldersync_core::PartialConfig;
use foldersync_sync::{NoopObserver, Synchronizer};

use super::{paint, TreeArgs};

/// Arguments for `foldersync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub trees: TreeArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let config = self.trees.check(PartialConfig::default())?;
        let synchronizer = Synchronizer::new(config, Arc::new(NoopObserver));
        let actions = synchronizer.preview().context("diff failed")?;

        if actions.is_empty() {
            println!("Replica is up to date.");
            return Ok(());
        }

        for action in &actions {
            println!("{}", paint(action));
        }
        println!("{} action(s)", actions.len());
        Ok(())
    }
}
