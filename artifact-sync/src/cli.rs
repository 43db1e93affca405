//! # artifact-sync CLI Interface (Module)
//!
//! Command parsing and the async entrypoint. All transfer logic (key mapping,
//! existence checks, mirroring, manifests) lives in `artifact-sync-core`; this
//! module only loads configuration, picks a store backend and prints the report.
//!
//! ## How To Use
//! - From a shell: `artifact-sync push` after `dvc repro`, `artifact-sync pull`
//!   on a fresh checkout.
//! - Programmatically or from tests: call [`run`] with a constructed [`Cli`].

use crate::load_config::{load_config, local_store_from_env};
use crate::store::S3Store;
use anyhow::Result;
use artifact_sync_core::config::SyncConfig;
use artifact_sync_core::contract::ObjectStore;
use artifact_sync_core::gate::TransferOutcome;
use artifact_sync_core::local_store::LocalStore;
use artifact_sync_core::manifest::run_timestamp;
use artifact_sync_core::synchronise::{pull, push, SyncReport};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI for artifact-sync: publish and retrieve ML pipeline outputs.
#[derive(Parser)]
#[clap(
    name = "artifact-sync",
    version,
    about = "Push and pull dataset, model, metric and figure artifacts to an object store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every artifact present in the workspace, then a run manifest
    Push(RunArgs),
    /// Download every artifact present in the bucket into the workspace
    Pull(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Optional YAML file with artifact layout, pipeline name and retry policy
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Directory that relative artifact paths resolve against
    #[clap(long, default_value = ".")]
    pub workspace: PathBuf,
}

/// Filesystem store when `ARTIFACT_LOCAL_STORE` is set, S3 otherwise.
async fn open_store(config: &SyncConfig) -> Box<dyn ObjectStore> {
    match local_store_from_env() {
        Some(root) => {
            tracing::info!(root = %root.display(), "Using local filesystem store");
            Box::new(LocalStore::new(root))
        }
        None => Box::new(S3Store::from_remote(&config.remote).await),
    }
}

fn print_report(command: &str, report: &SyncReport) {
    for artifact in &report.artifacts {
        let outcome = match artifact.outcome {
            TransferOutcome::Transferred => "transferred",
            TransferOutcome::Skipped => "skipped",
        };
        println!(
            "{outcome:<12} {:<8} {} <-> {}",
            artifact.category.to_string(),
            artifact.local_path.display(),
            artifact.remote_key
        );
    }
    if let Some(key) = &report.manifest_key {
        println!("manifest     {key}");
    }
    println!(
        "{command} complete: {} transferred, {} skipped",
        report.transferred(),
        report.skipped()
    );
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let (command, args) = match &cli.command {
        Commands::Push(args) => ("push", args),
        Commands::Pull(args) => ("pull", args),
    };
    let config = load_config(args.config.as_deref(), &args.workspace)?;
    let store = open_store(&config).await;
    tracing::info!(command, "Starting artifact synchronisation");

    let result = match cli.command {
        Commands::Push(_) => push(&config, &*store, &run_timestamp()).await,
        Commands::Pull(_) => pull(&config, &*store).await,
    };

    match result {
        Ok(report) => {
            tracing::info!(command, ?report, "Synchronisation complete");
            print_report(command, &report);
            Ok(())
        }
        Err(e) => {
            tracing::error!(command, error = %e, "Synchronisation failed");
            Err(anyhow::Error::new(e).context(format!("{command} failed")))
        }
    }
}
