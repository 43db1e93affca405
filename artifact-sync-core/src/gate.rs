//! Existence checks in front of every transfer.
//!
//! A missing local source (push) or missing remote object (pull) is logged as a
//! warning and reported as [`TransferOutcome::Skipped`]; it never fails the run.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::contract::ObjectStore;
use crate::error::SyncError;
use crate::resolve::{ArtifactDescriptor, ArtifactKind};
use crate::transfer::{create_parent_dir, TransferEngine};

pub const UPLOADED_METADATA_KEY: &str = "uploaded";
pub const PIPELINE_METADATA_KEY: &str = "pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred,
    Skipped,
}

pub struct ExistenceGate<'e, 'a, S: ObjectStore + ?Sized> {
    engine: &'e TransferEngine<'a, S>,
    provenance: HashMap<String, String>,
    upload_exclusions: Vec<String>,
}

impl<'e, 'a, S: ObjectStore + ?Sized> ExistenceGate<'e, 'a, S> {
    /// `timestamp` and `pipeline` become the provenance tags on every upload.
    pub fn new(engine: &'e TransferEngine<'a, S>, timestamp: &str, pipeline: &str) -> Self {
        let provenance = HashMap::from([
            (UPLOADED_METADATA_KEY.to_string(), timestamp.to_string()),
            (PIPELINE_METADATA_KEY.to_string(), pipeline.to_string()),
        ]);
        Self {
            engine,
            provenance,
            upload_exclusions: Vec::new(),
        }
    }

    /// Extensions left out of directory mirror uploads. Downloads are never filtered.
    pub fn with_upload_exclusions(mut self, extensions: &[String]) -> Self {
        self.upload_exclusions = extensions.to_vec();
        self
    }

    pub fn provenance(&self) -> &HashMap<String, String> {
        &self.provenance
    }

    /// Upload a file or mirror a directory, if it exists locally.
    pub async fn upload_if_exists(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<TransferOutcome, SyncError> {
        match descriptor.kind() {
            ArtifactKind::File => self.upload_file_if_exists(descriptor).await,
            ArtifactKind::Directory => self.upload_dir_if_exists(descriptor).await,
        }
    }

    /// Download a file or mirror a remote prefix, if anything exists remotely.
    pub async fn download_descriptor_if_exists(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<TransferOutcome, SyncError> {
        match descriptor.kind() {
            ArtifactKind::File => {
                self.download_if_exists(descriptor.remote_key(), descriptor.local_path())
                    .await
            }
            ArtifactKind::Directory => {
                self.download_dir_if_exists(descriptor.remote_key(), descriptor.local_path())
                    .await
            }
        }
    }

    async fn upload_file_if_exists(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<TransferOutcome, SyncError> {
        let local = descriptor.local_path();
        if !local.is_file() {
            warn!(
                category = %descriptor.category(),
                local_path = %local.display(),
                "Local file not found, skipping upload"
            );
            return Ok(TransferOutcome::Skipped);
        }
        info!(
            category = %descriptor.category(),
            local_path = %local.display(),
            key = descriptor.remote_key(),
            "Uploading"
        );
        self.engine
            .upload_file(local, descriptor.remote_key(), &self.provenance)
            .await?;
        Ok(TransferOutcome::Transferred)
    }

    async fn upload_dir_if_exists(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<TransferOutcome, SyncError> {
        let local = descriptor.local_path();
        if !local.is_dir() {
            warn!(
                category = %descriptor.category(),
                local_path = %local.display(),
                "Local directory not found, skipping mirror upload"
            );
            return Ok(TransferOutcome::Skipped);
        }
        info!(
            category = %descriptor.category(),
            local_path = %local.display(),
            key_prefix = descriptor.remote_key(),
            "Mirroring directory"
        );
        let keys = self
            .engine
            .mirror_upload(
                local,
                descriptor.remote_key(),
                &self.upload_exclusions,
                &self.provenance,
            )
            .await?;
        if keys.is_empty() {
            warn!(
                category = %descriptor.category(),
                local_path = %local.display(),
                "No uploadable files in directory, skipping mirror upload"
            );
            return Ok(TransferOutcome::Skipped);
        }
        info!(files = keys.len(), key_prefix = descriptor.remote_key(), "Mirror upload complete");
        Ok(TransferOutcome::Transferred)
    }

    /// Pull one object into `local_path`, creating parent directories as needed.
    pub async fn download_if_exists(
        &self,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<TransferOutcome, SyncError> {
        let Some(remote) = self.engine.probe(remote_key).await? else {
            warn!(key = remote_key, "Remote object not found, skipping download");
            return Ok(TransferOutcome::Skipped);
        };
        if let Some(parent) = local_path.parent() {
            create_parent_dir(parent).map_err(|source| SyncError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        info!(key = remote_key, local_path = %local_path.display(), "Downloading");
        self.engine
            .download_file(remote_key, local_path, &remote)
            .await?;
        Ok(TransferOutcome::Transferred)
    }

    /// Mirror everything under `key_prefix` into `local_dir`.
    pub async fn download_dir_if_exists(
        &self,
        key_prefix: &str,
        local_dir: &Path,
    ) -> Result<TransferOutcome, SyncError> {
        let objects = self.engine.list(key_prefix).await?;
        if objects.is_empty() {
            warn!(key_prefix, "No remote objects under prefix, skipping mirror download");
            return Ok(TransferOutcome::Skipped);
        }
        info!(
            key_prefix,
            local_dir = %local_dir.display(),
            objects = objects.len(),
            "Mirroring remote prefix"
        );
        let written = self
            .engine
            .mirror_download(key_prefix, &objects, local_dir)
            .await?;
        if written.is_empty() {
            warn!(key_prefix, "No downloadable objects under prefix, skipping mirror download");
            return Ok(TransferOutcome::Skipped);
        }
        info!(files = written.len(), key_prefix, "Mirror download complete");
        Ok(TransferOutcome::Transferred)
    }
}
