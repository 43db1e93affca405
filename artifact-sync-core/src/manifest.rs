//! Push-run audit record.
//!
//! Wire format:
//!
//! ```json
//! {
//!   "timestamp": "20240105_093000",
//!   "pipeline": "dvc",
//!   "files": [ { "path": "data/interim/clean.csv", "size": 1234 } ]
//! }
//! ```
//!
//! A file that is absent when the manifest is built is kept in memory as
//! `size: None` and written as `0`, the same value an empty file produces.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, error, info};

use crate::contract::ObjectStore;
use crate::error::SyncError;
use crate::gate::{PIPELINE_METADATA_KEY, UPLOADED_METADATA_KEY};
use crate::resolve::ArtifactDescriptor;
use crate::retry::RetryPolicy;

/// `yyyyMMdd_HHmmss`, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Run timestamp in the manifest format, local time.
pub fn run_timestamp() -> String {
    format_timestamp(&Local::now())
}

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    /// `None` when the file did not exist at manifest-build time.
    #[serde(
        rename = "size",
        serialize_with = "size_or_zero",
        deserialize_with = "size_present"
    )]
    pub size_bytes: Option<u64>,
}

fn size_or_zero<S: Serializer>(size: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(size.unwrap_or(0))
}

fn size_present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    u64::deserialize(d).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub timestamp: String,
    #[serde(rename = "pipeline")]
    pub pipeline_name: String,
    #[serde(rename = "files")]
    pub entries: Vec<ManifestEntry>,
}

impl ManifestRecord {
    pub fn to_json(&self) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Size the local files behind `attempted` as they are right now.
///
/// The probe is local on purpose: a transfer that failed or was skipped still
/// gets an entry reflecting the workspace, not the remote store.
/// Paths are recorded relative to `workspace_root` when they live under it.
pub fn build_manifest<'d>(
    pipeline_name: &str,
    timestamp: &str,
    workspace_root: &Path,
    attempted: impl IntoIterator<Item = &'d ArtifactDescriptor>,
) -> ManifestRecord {
    let entries = attempted
        .into_iter()
        .map(|d| {
            let local = d.local_path();
            let recorded = local.strip_prefix(workspace_root).unwrap_or(local);
            ManifestEntry {
                path: recorded.display().to_string(),
                size_bytes: local_size(local),
            }
        })
        .collect();
    ManifestRecord {
        timestamp: timestamp.to_string(),
        pipeline_name: pipeline_name.to_string(),
        entries,
    }
}

fn local_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

/// Serialises a manifest and writes it to the store. Any failure here is fatal.
pub struct ManifestRecorder<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    bucket: &'a str,
    retry: RetryPolicy,
}

impl<'a, S: ObjectStore + ?Sized> ManifestRecorder<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str, retry: RetryPolicy) -> Self {
        Self {
            store,
            bucket,
            retry,
        }
    }

    pub async fn upload(&self, manifest: &ManifestRecord, key: &str) -> Result<(), SyncError> {
        let body = manifest.to_json()?;
        debug!(key, bytes = body.len(), "Serialised manifest");
        let metadata = HashMap::from([
            (UPLOADED_METADATA_KEY.to_string(), manifest.timestamp.clone()),
            (PIPELINE_METADATA_KEY.to_string(), manifest.pipeline_name.clone()),
        ]);
        self.retry
            .run(key, || {
                self.store
                    .put_object(self.bucket, key, &body, "application/json", &metadata)
            })
            .await
            .map_err(|source| {
                error!(key, error = %source, "Manifest upload failed");
                SyncError::ManifestUploadFailure {
                    key: key.to_string(),
                    source,
                }
            })?;
        info!(key, entries = manifest.entries.len(), "Uploaded manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteLocation;
    use crate::resolve::{Category, PathResolver};
    use chrono::Utc;

    #[test]
    fn timestamp_has_second_resolution_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 7).unwrap();
        assert_eq!(format_timestamp(&at), "20240105_093007");
    }

    #[test]
    fn absent_and_empty_files_both_serialise_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, b"").unwrap();
        let remote = RemoteLocation::new("b", "", "r");
        let resolver = PathResolver::new(&remote);
        let descriptors = [
            resolver.file(Category::Metric, empty.clone()),
            resolver.file(Category::Model, dir.path().join("missing.joblib")),
        ];

        let manifest = build_manifest("dvc", "20240105_093007", dir.path(), &descriptors);
        assert_eq!(manifest.entries[0].size_bytes, Some(0));
        assert_eq!(manifest.entries[1].size_bytes, None);

        let json: serde_json::Value =
            serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(json["timestamp"], "20240105_093007");
        assert_eq!(json["pipeline"], "dvc");
        assert_eq!(json["files"][0]["size"], 0);
        assert_eq!(json["files"][1]["size"], 0);
        assert_eq!(json["files"][0]["path"], "empty.json");
        assert_eq!(json["files"][1]["path"], "missing.joblib");
    }
}
