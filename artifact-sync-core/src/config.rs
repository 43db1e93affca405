use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::retry::RetryPolicy;

pub const DEFAULT_BUCKET: &str = "mlops-pipeline-artifacts";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PIPELINE: &str = "dvc";

/// Where artifacts live remotely. Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    prefix: String,
    pub region: String,
    /// Override for S3-compatible endpoints (MinIO, localstack).
    pub endpoint_url: Option<String>,
}

impl RemoteLocation {
    pub fn new(bucket: impl Into<String>, prefix: &str, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: normalise_prefix(prefix),
            region: region.into(),
            endpoint_url: None,
        }
    }

    pub fn with_endpoint_url(mut self, endpoint_url: Option<String>) -> Self {
        self.endpoint_url = endpoint_url;
        self
    }

    /// Key prefix, either empty or ending in `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            region = %self.region,
            endpoint_url = self.endpoint_url.as_deref().unwrap_or("default"),
            "Loaded remote location"
        );
    }
}

fn normalise_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// The declarative list of pipeline outputs to publish and retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactLayout {
    pub dataset: PathBuf,
    pub models: Vec<PathBuf>,
    pub metrics: PathBuf,
    pub figures_dir: PathBuf,
    /// Extensions (without the dot) left out of the figures upload.
    pub figure_exclude_extensions: Vec<String>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/interim/dataset_limpio_refactored.csv"),
            models: vec![
                PathBuf::from("models/best_pipeline.joblib"),
                PathBuf::from("models/model_metadata.joblib"),
            ],
            metrics: PathBuf::from("reports/metrics/evaluation_metrics.json"),
            figures_dir: PathBuf::from("reports/figures"),
            figure_exclude_extensions: vec!["md".to_string(), "txt".to_string()],
        }
    }
}

/// Everything a push or pull run needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub remote: RemoteLocation,
    pub layout: ArtifactLayout,
    /// Provenance tag written to object metadata and to the manifest.
    pub pipeline: String,
    pub retry: RetryPolicy,
    /// Relative layout paths resolve against this directory.
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn new(remote: RemoteLocation, workspace_root: PathBuf) -> Self {
        Self {
            remote,
            layout: ArtifactLayout::default(),
            pipeline: DEFAULT_PIPELINE.to_string(),
            retry: RetryPolicy::default(),
            workspace_root,
        }
    }

    pub fn trace_loaded(&self) {
        self.remote.trace_loaded();
        info!(
            pipeline = %self.pipeline,
            workspace_root = %self.workspace_root.display(),
            models = self.layout.models.len(),
            max_attempts = self.retry.max_attempts,
            "Loaded sync config"
        );
        debug!(?self, "Sync config loaded (full debug)");
    }
}
