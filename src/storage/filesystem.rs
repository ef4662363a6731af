//! Filesystem-backed object store. `<root>/<bucket>/<object>`; object names
//! keep their slashes as subdirectories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{validate_object_name, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, object: &str) -> StorageResult<PathBuf> {
        validate_object_name(bucket)?;
        validate_object_name(object)?;
        Ok(self.root.join(bucket).join(object))
    }

    async fn copy_into(
        operation: &str,
        source: &Path,
        dest: &Path,
    ) -> StorageResult<u64> {
        let mut reader = fs::File::open(source)
            .await
            .map_err(|e| StorageError::io(operation, source, e))?;
        let mut writer = fs::File::create(dest)
            .await
            .map_err(|e| StorageError::io(operation, dest, e))?;
        let copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| StorageError::io(operation, dest, e))?;
        writer
            .sync_all()
            .await
            .map_err(|e| StorageError::io(operation, dest, e))?;
        Ok(copied)
    }

    async fn ensure_parent(operation: &str, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(operation, parent, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn download_to(&self, bucket: &str, object: &str, dest: &Path) -> StorageResult<u64> {
        let source = self.object_path(bucket, object)?;
        if !fs::try_exists(&source)
            .await
            .map_err(|e| StorageError::io("download", &source, e))?
        {
            return Err(StorageError::not_found(bucket, object));
        }

        let copied = Self::copy_into("download", &source, dest).await?;
        debug!(bucket = %bucket, object = %object, bytes = copied, "Downloaded object");
        Ok(copied)
    }

    async fn upload_file(&self, bucket: &str, object: &str, source: &Path) -> StorageResult<u64> {
        let dest = self.object_path(bucket, object)?;
        Self::ensure_parent("upload", &dest).await?;

        let copied = Self::copy_into("upload", source, &dest).await?;
        debug!(bucket = %bucket, object = %object, bytes = copied, "Uploaded file");
        Ok(copied)
    }

    async fn upload_bytes(&self, bucket: &str, object: &str, data: Vec<u8>) -> StorageResult<()> {
        let dest = self.object_path(bucket, object)?;
        Self::ensure_parent("upload", &dest).await?;

        let len = data.len();
        fs::write(&dest, data)
            .await
            .map_err(|e| StorageError::io("upload", &dest, e))?;
        debug!(bucket = %bucket, object = %object, bytes = len, "Uploaded buffer");
        Ok(())
    }

    async fn exists(&self, bucket: &str, object: &str) -> StorageResult<bool> {
        let path = self.object_path(bucket, object)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io("exists", &path, e))
    }

    fn provider_name(&self) -> &'static str {
        "filesystem"
    }
}
