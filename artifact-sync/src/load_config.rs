//! `load_config` module: builds the run's [`SyncConfig`] from the environment and
//! an optional YAML file.
//!
//! The remote location (bucket, prefix, region, endpoint) always comes from the
//! environment. The YAML file only describes the artifact layout, the pipeline
//! name and the retry policy; every key in it is optional.
//!
//! # Errors
//! All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.

use anyhow::{bail, Result};
use artifact_sync_core::config::{
    ArtifactLayout, RemoteLocation, SyncConfig, DEFAULT_BUCKET, DEFAULT_PIPELINE, DEFAULT_REGION,
};
use artifact_sync_core::retry::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const BUCKET_ENV: &str = "ARTIFACT_BUCKET";
pub const PREFIX_ENV: &str = "ARTIFACT_PREFIX";
pub const ENDPOINT_ENV: &str = "ARTIFACT_ENDPOINT_URL";
pub const LOCAL_STORE_ENV: &str = "ARTIFACT_LOCAL_STORE";

/// YAML-side shape of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub pipeline: Option<String>,
    pub artifacts: ArtifactLayout,
    pub retry: RetryPolicy,
}

/// Read a non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Remote location from `ARTIFACT_*` and `AWS_REGION` / `AWS_DEFAULT_REGION`.
pub fn remote_from_env() -> RemoteLocation {
    let bucket = env_value(BUCKET_ENV).unwrap_or_else(|| DEFAULT_BUCKET.to_string());
    let prefix = env_value(PREFIX_ENV).unwrap_or_default();
    let region = env_value("AWS_REGION")
        .or_else(|| env_value("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    RemoteLocation::new(bucket, &prefix, region).with_endpoint_url(env_value(ENDPOINT_ENV))
}

/// Root directory of the filesystem store, when one is configured.
pub fn local_store_from_env() -> Option<PathBuf> {
    env_value(LOCAL_STORE_ENV).map(PathBuf::from)
}

/// Parse the YAML config file at `path`.
pub fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file means "all defaults".
    if config_content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    match serde_yaml::from_str::<FileConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Build the run configuration for a workspace.
pub fn load_config(config_path: Option<&Path>, workspace: &Path) -> Result<SyncConfig> {
    let file = match config_path {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    validate(&file)?;

    if workspace.exists() && !workspace.is_dir() {
        bail!("Workspace {} is not a directory", workspace.display());
    }

    let mut config = SyncConfig::new(remote_from_env(), workspace.to_path_buf());
    config.layout = file.artifacts;
    config.retry = file.retry;
    config.pipeline = file
        .pipeline
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PIPELINE.to_string());
    if config.remote.bucket.contains('/') {
        bail!("Bucket name {:?} must not contain '/'", config.remote.bucket);
    }
    config.trace_loaded();
    Ok(config)
}

fn validate(file: &FileConfig) -> Result<()> {
    if file.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be at least 1");
    }
    if file.retry.base_delay_ms > file.retry.max_delay_ms {
        bail!(
            "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
            file.retry.base_delay_ms,
            file.retry.max_delay_ms
        );
    }
    let layout = &file.artifacts;
    let single_files = std::iter::once(&layout.dataset)
        .chain(layout.models.iter())
        .chain(std::iter::once(&layout.metrics));
    for path in single_files {
        if path.file_name().is_none() {
            bail!("Artifact path {} has no file name", path.display());
        }
    }
    Ok(())
}
