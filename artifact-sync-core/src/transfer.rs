//! Byte movement between the workspace and the object store.
//!
//! Every single-object copy runs under the configured [`RetryPolicy`] and is
//! verified afterwards: uploads by a head request (size, plus the SHA-256 tag
//! when the store reports it), downloads by re-hashing the file against the
//! object's `sha256` tag when it carries one.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use crate::contract::{ObjectInfo, ObjectMetadata, ObjectStore, SHA256_METADATA_KEY};
use crate::error::{StoreError, SyncError};
use crate::retry::RetryPolicy;

/// Hex-encoded SHA-256 of a local file.
pub async fn sha256_file(path: &Path) -> Result<String, StoreError> {
    let display = path.display().to_string();
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StoreError::io(&display, &e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| StoreError::io(&display, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct TransferEngine<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    bucket: &'a str,
    retry: RetryPolicy,
}

impl<'a, S: ObjectStore + ?Sized> TransferEngine<'a, S> {
    pub fn new(store: &'a S, bucket: &'a str, retry: RetryPolicy) -> Self {
        Self {
            store,
            bucket,
            retry,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn bucket(&self) -> &'a str {
        self.bucket
    }

    /// Head an object, retrying transient failures.
    pub async fn probe(&self, key: &str) -> Result<Option<ObjectMetadata>, SyncError> {
        self.retry
            .run(key, || self.store.head_object(self.bucket, key))
            .await
            .map_err(|source| SyncError::TransferFailure {
                key: key.to_string(),
                source,
            })
    }

    /// List objects under a prefix, ignoring directory markers.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, SyncError> {
        let mut objects = self
            .retry
            .run(prefix, || self.store.list_objects(self.bucket, prefix))
            .await
            .map_err(|source| SyncError::TransferFailure {
                key: prefix.to_string(),
                source,
            })?;
        objects.retain(|o| !o.key.ends_with('/'));
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    /// Copy one local file to `key`, tagging it with `metadata` plus its digest.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<u64, SyncError> {
        let failure = |source| SyncError::TransferFailure {
            key: key.to_string(),
            source,
        };
        let local_display = local_path.display().to_string();
        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| failure(StoreError::io(&local_display, &e)))?
            .len();
        let digest = sha256_file(local_path).await.map_err(failure)?;

        let mut tagged = metadata.clone();
        tagged.insert(SHA256_METADATA_KEY.to_string(), digest.clone());

        self.retry
            .run(key, || async {
                self.store
                    .put_object_from_file(self.bucket, key, local_path, &tagged)
                    .await?;
                self.verify_upload(key, size, &digest).await
            })
            .await
            .map_err(|e| {
                error!(key, local_path = %local_display, error = %e, "Upload failed");
                failure(e)
            })?;

        info!(key, local_path = %local_display, size, "Uploaded file");
        Ok(size)
    }

    async fn verify_upload(&self, key: &str, size: u64, digest: &str) -> Result<(), StoreError> {
        let stored = self
            .store
            .head_object(self.bucket, key)
            .await?
            .ok_or_else(|| StoreError::IntegrityMismatch {
                key: key.to_string(),
                message: "object missing after upload".to_string(),
            })?;
        if stored.size != size {
            return Err(StoreError::IntegrityMismatch {
                key: key.to_string(),
                message: format!("expected {size} bytes, store reports {}", stored.size),
            });
        }
        if let Some(remote_digest) = stored.sha256() {
            if remote_digest != digest {
                return Err(StoreError::IntegrityMismatch {
                    key: key.to_string(),
                    message: format!("sha256 {remote_digest} does not match local {digest}"),
                });
            }
        }
        debug!(key, size, "Upload verified");
        Ok(())
    }

    /// Copy one object to `local_path`; its parent directory must already exist.
    ///
    /// Bytes land in a sibling staging file and replace `local_path` only once
    /// verified, so a failed download leaves any existing local copy intact.
    pub async fn download_file(
        &self,
        key: &str,
        local_path: &Path,
        remote: &ObjectMetadata,
    ) -> Result<(), SyncError> {
        let local_display = local_path.display().to_string();
        let parent = match local_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        self.retry
            .run(key, || async {
                let staging = tempfile::Builder::new()
                    .prefix(".artifact-sync-")
                    .tempfile_in(parent)
                    .map_err(|e| StoreError::io(parent.display().to_string(), &e))?
                    .into_temp_path();
                self.store
                    .get_object_to_file(self.bucket, key, &staging)
                    .await?;
                verify_download(key, &staging, remote).await?;
                staging
                    .persist(local_path)
                    .map_err(|e| StoreError::io(local_path.display().to_string(), &e.error))
            })
            .await
            .map_err(|source| {
                error!(key, local_path = %local_display, error = %source, "Download failed");
                SyncError::TransferFailure {
                    key: key.to_string(),
                    source,
                }
            })?;
        info!(key, local_path = %local_display, size = remote.size, "Downloaded file");
        Ok(())
    }

    /// Upload every file under `local_dir` to `key_prefix`, skipping excluded
    /// extensions. Nothing is deleted remotely. Returns the keys written.
    pub async fn mirror_upload(
        &self,
        local_dir: &Path,
        key_prefix: &str,
        exclude_extensions: &[String],
        metadata: &HashMap<String, String>,
    ) -> Result<Vec<String>, SyncError> {
        let files = collect_files(local_dir).map_err(|source| SyncError::Io {
            path: local_dir.display().to_string(),
            source,
        })?;

        let mut uploaded = Vec::new();
        for path in files {
            if is_excluded(&path, exclude_extensions) {
                debug!(path = %path.display(), "Excluded from mirror upload");
                continue;
            }
            let Some(relative) = relative_key(local_dir, &path) else {
                continue;
            };
            let key = format!("{key_prefix}{relative}");
            self.upload_file(&path, &key, metadata).await?;
            uploaded.push(key);
        }
        Ok(uploaded)
    }

    /// Download every listed object under `key_prefix` into `local_dir`, with
    /// no extension filter. Extraneous local files are left in place.
    pub async fn mirror_download(
        &self,
        key_prefix: &str,
        objects: &[ObjectInfo],
        local_dir: &Path,
    ) -> Result<Vec<PathBuf>, SyncError> {
        let mut written = Vec::new();
        for object in objects {
            let Some(target) = local_target(local_dir, key_prefix, &object.key) else {
                warn!(key = %object.key, "Skipping object whose key escapes the target directory");
                continue;
            };
            let Some(remote) = self.probe(&object.key).await? else {
                warn!(key = %object.key, "Object disappeared after listing, skipping");
                continue;
            };
            if let Some(parent) = target.parent() {
                create_parent_dir(parent).map_err(|source| SyncError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
            self.download_file(&object.key, &target, &remote).await?;
            written.push(target);
        }
        Ok(written)
    }
}

async fn verify_download(
    key: &str,
    local_path: &Path,
    remote: &ObjectMetadata,
) -> Result<(), StoreError> {
    let Some(expected) = remote.sha256() else {
        return Ok(());
    };
    let actual = sha256_file(local_path).await?;
    if actual != expected {
        return Err(StoreError::IntegrityMismatch {
            key: key.to_string(),
            message: format!("downloaded sha256 {actual} does not match tagged {expected}"),
        });
    }
    Ok(())
}

pub(crate) fn create_parent_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    debug!(path = %dir.display(), "Created local directory");
    Ok(())
}

/// All regular files below `dir`, sorted so runs are deterministic.
fn collect_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fn visit_dir(dir: &Path, results: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry_res in std::fs::read_dir(dir)? {
            let entry = entry_res?;
            let path = entry.path();
            // file_type() does not follow symlinks; linked directories are never descended.
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                visit_dir(&path, results)?;
            } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                results.push(path);
            } else if file_type.is_symlink() {
                debug!(path = %path.display(), "Not following symlinked directory");
            }
        }
        Ok(())
    }

    let mut results = Vec::new();
    visit_dir(dir, &mut results)?;
    results.sort();
    Ok(results)
}

fn is_excluded(path: &Path, exclude_extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    exclude_extensions
        .iter()
        .any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// `a/b/c.png` style key suffix for a file under `root`.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Local destination for `key`, or `None` when the key does not sit under
/// `key_prefix` or tries to climb out of `local_dir`.
fn local_target(local_dir: &Path, key_prefix: &str, key: &str) -> Option<PathBuf> {
    let relative = key.strip_prefix(key_prefix)?;
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(local_dir.join(relative))
}
