//! Filesystem-backed [`ObjectStore`].
//!
//! Objects live at `<root>/<bucket>/<key>`; user metadata for each object is kept
//! as JSON at `<root>/.metadata/<bucket>/<key>.json`. Used for offline runs
//! (`ARTIFACT_LOCAL_STORE`) and for tests that need real bytes on both sides.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::contract::{ObjectInfo, ObjectMetadata, ObjectStore};
use crate::error::StoreError;

const METADATA_DIR: &str = ".metadata";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(checked(bucket)?).join(checked(key)?))
    }

    fn metadata_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self
            .root
            .join(METADATA_DIR)
            .join(checked(bucket)?)
            .join(checked(key)?)
            .into_os_string();
        path.push(".json");
        Ok(PathBuf::from(path))
    }

    async fn write_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let path = self.metadata_path(bucket, key)?;
        ensure_parent(&path).await?;
        let body = serde_json::to_vec(metadata).map_err(|e| StoreError::Other {
            message: format!("failed to encode metadata for {key}: {e}"),
        })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError::io(path.display().to_string(), &e))
    }
}

/// Rejects empty keys and any key that could resolve outside the store root.
fn checked(key: &str) -> Result<&Path, StoreError> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(path)
    } else {
        Err(StoreError::Other {
            message: format!("invalid object key: {key:?}"),
        })
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent.display().to_string(), &e))?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        let path = self.object_path(bucket, key)?;
        let size = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path.display().to_string(), &e)),
        };
        let meta_path = self.metadata_path(bucket, key)?;
        let user_metadata = match tokio::fs::read(&meta_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Other {
                message: format!("corrupt metadata for {key}: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::io(meta_path.display().to_string(), &e)),
        };
        Ok(Some(ObjectMetadata {
            size,
            user_metadata,
        }))
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let target = self.object_path(bucket, key)?;
        ensure_parent(&target).await?;
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| StoreError::io(path.display().to_string(), &e))?;
        self.write_metadata(bucket, key, metadata).await?;
        debug!(bucket, key, "Stored object from file");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        _content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let target = self.object_path(bucket, key)?;
        ensure_parent(&target).await?;
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| StoreError::io(target.display().to_string(), &e))?;
        self.write_metadata(bucket, key, metadata).await?;
        debug!(bucket, key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        let source = self.object_path(bucket, key)?;
        match tokio::fs::copy(&source, path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !source.exists() => {
                Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => Err(StoreError::io(path.display().to_string(), &e)),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        let bucket_root = self.root.join(checked(bucket)?);
        let mut objects = Vec::new();
        let mut pending = vec![bucket_root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(dir.display().to_string(), &e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(dir.display().to_string(), &e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::io(path.display().to_string(), &e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(prefix) {
                    continue;
                }
                let size = entry
                    .metadata()
                    .await
                    .map_err(|e| StoreError::io(path.display().to_string(), &e))?
                    .len();
                objects.push(ObjectInfo { key, size });
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_head_get_and_list() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("store"));
        let metadata = HashMap::from([("pipeline".to_string(), "dvc".to_string())]);

        store
            .put_object("bucket", "figures/a/roc.png", b"png", "image/png", &metadata)
            .await
            .unwrap();
        store
            .put_object("bucket", "models/m.joblib", b"model", "application/octet-stream", &metadata)
            .await
            .unwrap();

        let head = store
            .head_object("bucket", "figures/a/roc.png")
            .await
            .unwrap()
            .expect("object exists");
        assert_eq!(head.size, 3);
        assert_eq!(head.user_metadata.get("pipeline").map(String::as_str), Some("dvc"));
        assert!(store.head_object("bucket", "figures/nope.png").await.unwrap().is_none());

        let listed = store.list_objects("bucket", "figures/").await.unwrap();
        assert_eq!(
            listed,
            vec![ObjectInfo {
                key: "figures/a/roc.png".to_string(),
                size: 3
            }]
        );

        let out = dir.path().join("roc.png");
        store
            .get_object_to_file("bucket", "figures/a/roc.png", &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"png");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let err = store
            .get_object_to_file("bucket", "data/x.csv", &dir.path().join("x.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.list_objects("bucket", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_root() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let err = store
            .put_object("bucket", "../outside", b"x", "text/plain", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Other { .. }));
    }
}
