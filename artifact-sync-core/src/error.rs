//! Error types for store access and synchronisation runs.

use thiserror::Error;

/// Errors raised by an [`ObjectStore`](crate::contract::ObjectStore) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Object not found in the remote store.
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Credentials were rejected or lack permission.
    #[error("Access denied to {bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Transport-level failure.
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// Local filesystem failure while reading or writing a transferred file.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Post-transfer verification failed.
    #[error("Integrity check failed for {key}: {message}")]
    IntegrityMismatch { key: String, message: String },

    #[error("{message}")]
    Other { message: String },
}

impl StoreError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network { retryable, .. } => *retryable,
            StoreError::IntegrityMismatch { .. } => true,
            StoreError::NotFound { .. } => false,
            StoreError::AccessDenied { .. } => false,
            StoreError::Io { .. } => false,
            StoreError::Other { .. } => false,
        }
    }

    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors that abort a push or pull run.
///
/// Missing local files and missing remote objects are not errors; they surface
/// as [`TransferOutcome::Skipped`](crate::gate::TransferOutcome::Skipped).
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transfer failed for {key}: {source}")]
    TransferFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Manifest upload failed for {key}: {source}")]
    ManifestUploadFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to serialise manifest: {0}")]
    ManifestSerialize(#[from] serde_json::Error),

    #[error("Remote key {key} is claimed by both {first} and {second}")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
