pub mod diff;
pub mod once;
pub mod run;
pub mod snapshot;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use foldersync_core::{config, Action, PartialConfig, SyncConfig};

/// Source/replica pair plus the optional config file, shared by every
/// command that syncs.
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Directory to mirror (may come from the config file instead).
    pub source: Option<PathBuf>,

    /// Directory kept identical to the source; created if absent.
    pub replica: Option<PathBuf>,

    /// YAML config file. Defaults to ~/.foldersync/config.yaml when present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl TreeArgs {
    /// Config file layer, then command-line values, then defaults.
    pub fn resolve(&self, overrides: PartialConfig) -> Result<SyncConfig> {
        let file = match &self.config {
            Some(path) => config::load_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => config::load_default().context("failed to load default config")?,
        };
        let cli = PartialConfig {
            source: self.source.clone(),
            replica: self.replica.clone(),
            ..overrides
        };
        let resolved = file.merge(cli).resolve().context("invalid configuration")?;
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve), then reject overlapping trees. The
    /// replica is left untouched.
    pub fn check(&self, overrides: PartialConfig) -> Result<SyncConfig> {
        let resolved = self.resolve(overrides)?;
        resolved.check().context("invalid configuration")
    }

    /// [`resolve`](Self::resolve), then reject overlapping trees and create
    /// the replica.
    pub fn prepare(&self, overrides: PartialConfig) -> Result<SyncConfig> {
        let resolved = self.resolve(overrides)?;
        resolved.prepare().context("invalid configuration")
    }
}

/// One action as a colored line: `+` creates, `~` copies, `-` deletes.
pub fn paint(action: &Action) -> String {
    let path = action.path().display().to_string();
    match action {
        Action::CreateDir(_) => format!("{} {}/", "+".green().bold(), path),
        Action::CopyFile(_) => format!("{} {}", "~".yellow().bold(), path),
        Action::DeleteFile(_) => format!("{} {}", "-".red().bold(), path),
        Action::DeleteDir(_) => format!("{} {}/", "-".red().bold(), path),
    }
}
