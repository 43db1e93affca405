//! # contract: the object store interface
//!
//! This module defines the single trait ([`ObjectStore`]) the transfer engine talks to,
//! and the plain data types it returns.
//!
//! ## Interface & Extensibility
//! - Implement [`ObjectStore`] to add a new backend (S3, filesystem, test double).
//! - All methods are async and return [`StoreError`] so callers can decide whether
//!   a failure is worth retrying.
//! - `head_object` returns `Ok(None)` for a missing object; a missing object is
//!   never an error at this layer.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockObjectStore` is exported behind the
//!   `test-export-mocks` feature so dependent crates can use it in their tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StoreError;

/// Metadata key carrying the SHA-256 digest of an uploaded object.
pub const SHA256_METADATA_KEY: &str = "sha256";

/// An object found by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key, including the configured prefix.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Result of a head request on an existing object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    /// User metadata attached at upload time (provenance tags, digest).
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn sha256(&self) -> Option<&str> {
        self.user_metadata
            .get(SHA256_METADATA_KEY)
            .map(String::as_str)
    }
}

/// Low-level object store operations, implemented by each backend.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch size and user metadata for an object, or `None` if it does not exist.
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError>;

    /// Upload a local file, attaching the given user metadata.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Upload an in-memory body.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Download an object to a local path. The parent directory must exist.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), StoreError>;

    /// List every object whose key starts with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ObjectInfo>, StoreError>;
}
