//! foldersync — one-way folder synchronization CLI.
//!
//! # Usage
//!
//! ```text
//! foldersync run <source> <replica> [-i SECS] [--log-file PATH] [--always] ...
//! foldersync once <source> <replica> [--dry-run] [--json]
//! foldersync diff <source> <replica>
//! foldersync snapshot <path> [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, once::OnceArgs, run::RunArgs, snapshot::SnapshotArgs};

#[derive(Parser, Debug)]
#[command(
    name = "foldersync",
    version,
    about = "Keep a replica directory identical to a source directory",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the source and reconcile the replica until interrupted.
    Run(RunArgs),

    /// Run a single sync pass and print what it did.
    Once(OnceArgs),

    /// Show the actions a pass would apply, without touching the replica.
    Diff(DiffArgs),

    /// Print the fingerprint of every entry under a directory.
    Snapshot(SnapshotArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Once(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Snapshot(args) => args.run(),
    }
}
