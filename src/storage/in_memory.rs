//! In-memory object store.
//!
//! Objects live in a `DashMap` keyed by `bucket/object`. Every download and
//! upload request is recorded in order, and individual objects can be marked
//! to fail on upload, so tests can observe exactly what a component asked
//! storage for.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{validate_object_name, ObjectStore, StorageError, StorageResult};

/// A recorded storage request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRequest {
    Download { bucket: String, object: String },
    Upload { bucket: String, object: String },
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
    requests: Mutex<Vec<StorageRequest>>,
    failing_uploads: Mutex<Vec<(String, String)>>,
}

fn object_key(bucket: &str, object: &str) -> String {
    format!("{bucket}/{object}")
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing the request log
    pub fn insert(&self, bucket: &str, object: &str, data: impl Into<Vec<u8>>) {
        self.objects.insert(object_key(bucket, object), data.into());
    }

    pub fn get(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&object_key(bucket, object))
            .map(|entry| entry.value().clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Make every upload into `bucket` whose object name ends with `suffix`
    /// fail with a backend error
    pub fn fail_uploads_ending_with(&self, bucket: &str, suffix: &str) {
        self.failing_uploads
            .lock()
            .push((bucket.to_string(), suffix.to_string()));
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.requests.lock().clone()
    }

    /// Object names downloaded so far, in arrival order
    pub fn downloaded_objects(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                StorageRequest::Download { object, .. } => Some(object.clone()),
                StorageRequest::Upload { .. } => None,
            })
            .collect()
    }

    fn record_upload(&self, bucket: &str, object: &str) -> StorageResult<()> {
        validate_object_name(bucket)?;
        validate_object_name(object)?;
        self.requests.lock().push(StorageRequest::Upload {
            bucket: bucket.to_string(),
            object: object.to_string(),
        });

        if self
            .failing_uploads
            .lock()
            .iter()
            .any(|(b, suffix)| b == bucket && object.ends_with(suffix.as_str()))
        {
            return Err(StorageError::backend(format!(
                "upload of {bucket}/{object} refused"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn download_to(&self, bucket: &str, object: &str, dest: &Path) -> StorageResult<u64> {
        validate_object_name(bucket)?;
        validate_object_name(object)?;
        self.requests.lock().push(StorageRequest::Download {
            bucket: bucket.to_string(),
            object: object.to_string(),
        });

        let data = self
            .get(bucket, object)
            .ok_or_else(|| StorageError::not_found(bucket, object))?;

        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| StorageError::io("download", dest, e))?;
        Ok(data.len() as u64)
    }

    async fn upload_file(&self, bucket: &str, object: &str, source: &Path) -> StorageResult<u64> {
        self.record_upload(bucket, object)?;

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| StorageError::io("upload", source, e))?;
        let len = data.len() as u64;
        self.objects.insert(object_key(bucket, object), data);
        Ok(len)
    }

    async fn upload_bytes(&self, bucket: &str, object: &str, data: Vec<u8>) -> StorageResult<()> {
        self.record_upload(bucket, object)?;
        self.objects.insert(object_key(bucket, object), data);
        Ok(())
    }

    async fn exists(&self, bucket: &str, object: &str) -> StorageResult<bool> {
        validate_object_name(bucket)?;
        validate_object_name(object)?;
        Ok(self.objects.contains_key(&object_key(bucket, object)))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_download_records_request_and_writes_file() {
        let store = InMemoryObjectStore::new();
        let dir = TempDir::new().unwrap();
        store.insert("inputs", "a/pre.ssz", b"abc".to_vec());

        let dest = dir.path().join("pre.ssz");
        let n = store.download_to("inputs", "a/pre.ssz", &dest).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
        assert_eq!(store.downloaded_objects(), vec!["a/pre.ssz".to_string()]);

        let err = store
            .download_to("inputs", "a/missing.ssz", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(store.downloaded_objects().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_upload_leaves_no_object() {
        let store = InMemoryObjectStore::new();
        store.fail_uploads_ending_with("results", "std_err_log.txt");

        store
            .upload_bytes("results", "x/std_out_log.txt", b"out".to_vec())
            .await
            .unwrap();
        let err = store
            .upload_bytes("results", "x/std_err_log.txt", b"err".to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend { .. }));
        assert!(store.exists("results", "x/std_out_log.txt").await.unwrap());
        assert!(!store.exists("results", "x/std_err_log.txt").await.unwrap());
        assert_eq!(store.requests().len(), 2);
    }
}
