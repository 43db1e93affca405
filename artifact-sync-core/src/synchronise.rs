//! High-level runs: push and pull the fixed artifact list.
//!
//! Both runs walk the same [`ArtifactPlan`] in order (dataset, models, metrics,
//! figures), routing each descriptor through the [`ExistenceGate`]. Push then
//! records a manifest of the single-file artifacts and uploads it under a
//! timestamped key. Pull never reads a manifest.
//!
//! # Error Handling
//! Skips are reported, not raised. The first [`SyncError`] aborts the run and is
//! returned as is; categories after the failing one are not attempted and no
//! manifest is written. There is no resumption.

use std::path::PathBuf;

use tracing::{error, info};

use crate::config::SyncConfig;
use crate::contract::ObjectStore;
use crate::error::SyncError;
use crate::gate::{ExistenceGate, TransferOutcome};
use crate::manifest::{build_manifest, run_timestamp, ManifestRecorder};
use crate::resolve::{ArtifactPlan, Category, PathResolver};
use crate::transfer::TransferEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub category: Category,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub artifacts: Vec<ArtifactReport>,
    /// Set by push once the manifest is stored.
    pub manifest_key: Option<String>,
}

impl SyncReport {
    pub fn transferred(&self) -> usize {
        self.count(TransferOutcome::Transferred)
    }

    pub fn skipped(&self) -> usize {
        self.count(TransferOutcome::Skipped)
    }

    fn count(&self, outcome: TransferOutcome) -> usize {
        self.artifacts.iter().filter(|a| a.outcome == outcome).count()
    }
}

/// Upload every artifact that exists locally, then the manifest.
///
/// `timestamp` names the manifest and tags every object; two pushes sharing a
/// timestamp write the same manifest key and the later one wins.
pub async fn push<S>(config: &SyncConfig, store: &S, timestamp: &str) -> Result<SyncReport, SyncError>
where
    S: ObjectStore + ?Sized,
{
    info!(
        bucket = %config.remote.bucket,
        prefix = config.remote.prefix(),
        timestamp,
        "[PUSH] Starting artifact push"
    );
    let plan = ArtifactPlan::from_config(config)?;
    let engine = TransferEngine::new(store, &config.remote.bucket, config.retry);
    let gate = ExistenceGate::new(&engine, timestamp, &config.pipeline)
        .with_upload_exclusions(&config.layout.figure_exclude_extensions);

    let mut report = SyncReport::default();
    for descriptor in plan.descriptors() {
        let outcome = gate.upload_if_exists(descriptor).await.map_err(|e| {
            error!(category = %descriptor.category(), error = %e, "[PUSH] Aborting run");
            e
        })?;
        report.artifacts.push(ArtifactReport {
            category: descriptor.category(),
            local_path: descriptor.local_path().to_path_buf(),
            remote_key: descriptor.remote_key().to_string(),
            outcome,
        });
    }

    let manifest = build_manifest(
        &config.pipeline,
        timestamp,
        &config.workspace_root,
        plan.files(),
    );
    let manifest_key = PathResolver::new(&config.remote).manifest_key(timestamp);
    ManifestRecorder::new(store, &config.remote.bucket, config.retry)
        .upload(&manifest, &manifest_key)
        .await?;
    report.manifest_key = Some(manifest_key);

    info!(
        transferred = report.transferred(),
        skipped = report.skipped(),
        manifest_key = report.manifest_key.as_deref().unwrap_or_default(),
        "[PUSH] Complete"
    );
    Ok(report)
}

/// Download every artifact that exists remotely into its local path.
pub async fn pull<S>(config: &SyncConfig, store: &S) -> Result<SyncReport, SyncError>
where
    S: ObjectStore + ?Sized,
{
    info!(
        bucket = %config.remote.bucket,
        prefix = config.remote.prefix(),
        "[PULL] Starting artifact pull"
    );
    let plan = ArtifactPlan::from_config(config)?;
    let engine = TransferEngine::new(store, &config.remote.bucket, config.retry);
    let gate = ExistenceGate::new(&engine, &run_timestamp(), &config.pipeline);

    let mut report = SyncReport::default();
    for descriptor in plan.descriptors() {
        let outcome = gate
            .download_descriptor_if_exists(descriptor)
            .await
            .map_err(|e| {
                error!(category = %descriptor.category(), error = %e, "[PULL] Aborting run");
                e
            })?;
        report.artifacts.push(ArtifactReport {
            category: descriptor.category(),
            local_path: descriptor.local_path().to_path_buf(),
            remote_key: descriptor.remote_key().to_string(),
            outcome,
        });
    }

    info!(
        transferred = report.transferred(),
        skipped = report.skipped(),
        "[PULL] Complete"
    );
    Ok(report)
}
