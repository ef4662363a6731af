//! Staging Directory Manager
//!
//! Each attempt gets `<root>/<key segment>/<attempt key>`, where the key
//! segment is the hex SHA-256 of the task key. Task keys are opaque and may
//! contain separators or `..`; hashing keeps every attempt inside the root
//! while still grouping attempts of one key together. The leaf is created with
//! `create_dir`, not `create_dir_all`, so two attempts can never share a
//! directory. Release removes the attempt directory and then the per-key
//! parent if no sibling attempt is still using it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StagingError;

#[derive(Debug, Clone)]
pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name shared by every attempt of `key`
    pub fn key_segment(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Path an attempt would be staged at, without touching the filesystem
    pub fn path_for(&self, key: &str, attempt_key: &str) -> Result<PathBuf, StagingError> {
        validate_segment(attempt_key)?;
        Ok(self.root.join(Self::key_segment(key)).join(attempt_key))
    }

    /// Create the attempt's working directory
    pub async fn allocate(&self, key: &str, attempt_key: &str) -> Result<PathBuf, StagingError> {
        let path = self.path_for(key, attempt_key)?;
        let parent = path.parent().unwrap_or(self.root.as_path());

        // A concurrent release may remove an empty parent between the two
        // creates; one retry covers it.
        let mut retried = false;
        loop {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StagingError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;

            match fs::create_dir(&path).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::NotFound && !retried => retried = true,
                Err(source) => {
                    return Err(StagingError::Directory {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }

        debug!(path = %path.display(), key = %key, "Allocated staging directory");
        Ok(path)
    }

    /// Remove an attempt's working directory, then its per-key parent when
    /// empty; failures are logged only
    pub async fn release(&self, path: &Path) {
        match fs::remove_dir_all(path).await {
            Ok(()) => debug!(path = %path.display(), "Released staging directory"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
            }
        }

        let Some(parent) = path.parent().filter(|parent| *parent != self.root.as_path()) else {
            return;
        };
        match fs::remove_dir(parent).await {
            Ok(()) => debug!(path = %parent.display(), "Removed empty key directory"),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {}
            Err(e) => {
                debug!(path = %parent.display(), error = %e, "Key directory left in place");
            }
        }
    }
}

fn validate_segment(segment: &str) -> Result<(), StagingError> {
    let reason = if segment.is_empty() {
        Some("empty")
    } else if segment == "." || segment == ".." {
        Some("relative path component")
    } else if segment.contains(['/', '\\', '\0']) {
        Some("contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StagingError::UnsafeAttemptKey {
            attempt_key: segment.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
