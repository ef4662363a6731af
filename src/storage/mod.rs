//! # Object Storage
//!
//! Provider-agnostic read/write primitives for the input and result buckets.
//! Components hold an `Arc<dyn ObjectStore>`; the provider is picked from
//! `storage.provider` at startup.
//!
//! - [`FilesystemObjectStore`]: each bucket is a directory below a root
//! - [`InMemoryObjectStore`]: `DashMap`-backed, for tests and local runs

mod filesystem;
mod in_memory;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use filesystem::FilesystemObjectStore;
pub use in_memory::{InMemoryObjectStore, StorageRequest};

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{object}")]
    NotFound { bucket: String, object: String },

    #[error("Invalid object name '{name}': {reason}")]
    InvalidObjectName { name: String, reason: String },

    #[error("I/O error during {operation} on {path}: {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage timeout: {operation} timed out after {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn not_found(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    pub fn invalid_object_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObjectName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.display().to_string(),
            source,
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds: timeout.as_secs(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read/write access to named objects in buckets
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Copy an object into a local file, returning the number of bytes written
    async fn download_to(&self, bucket: &str, object: &str, dest: &Path) -> StorageResult<u64>;

    /// Store a local file as an object, returning the number of bytes stored
    async fn upload_file(&self, bucket: &str, object: &str, source: &Path) -> StorageResult<u64>;

    /// Store an in-memory buffer as an object
    async fn upload_bytes(&self, bucket: &str, object: &str, data: Vec<u8>) -> StorageResult<()>;

    async fn exists(&self, bucket: &str, object: &str) -> StorageResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Run a storage call under a per-call deadline
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, call: F) -> StorageResult<T>
where
    F: std::future::Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::timeout(operation, timeout)),
    }
}

/// Reject bucket and object names that could leave the storage root
pub(crate) fn validate_object_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::invalid_object_name(name, "name is empty"));
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err(StorageError::invalid_object_name(
            name,
            "name must be a relative, slash-separated path",
        ));
    }
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::invalid_object_name(
            name,
            "name contains an empty, '.' or '..' segment",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_validation() {
        assert!(validate_object_name("v0.8.3/minimal/abc/pre.ssz").is_ok());
        assert!(validate_object_name("results-eth2team").is_ok());

        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("/etc/passwd").is_err());
        assert!(validate_object_name("a/../b").is_err());
        assert!(validate_object_name("a//b").is_err());
        assert!(validate_object_name("a\\b").is_err());
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_deadline() {
        let result: StorageResult<()> = with_timeout("download", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StorageError::Timeout { .. })));
    }
}
