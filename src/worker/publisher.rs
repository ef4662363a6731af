//! Result Publisher
//!
//! Uploads the post-state and both captured logs under a per-attempt prefix in
//! the results bucket, then emits the result record to the results queue.
//! Uploads are independent and best effort; the record says which succeeded.
//! The record is emitted at most once per attempt and only after every upload
//! was attempted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::PublishError;
use crate::messaging::{MessagingProvider, ResultFiles, ResultRecord, ResultUploads};
use crate::storage::{with_timeout, ObjectStore, StorageResult};
use crate::worker::attempt::Attempt;
use crate::worker::executor::ExecutionOutcome;
use crate::worker::fingerprint::{format_digest, POST_STATE_FILE};

pub const STDOUT_LOG_FILE: &str = "std_out_log.txt";
pub const STDERR_LOG_FILE: &str = "std_err_log.txt";

/// Object names of one attempt's result artifacts:
/// `{sv}/{sc}/{key}/{client}/{version}/{attempt}/{file}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocations {
    pub post_state: String,
    pub out_log: String,
    pub err_log: String,
}

impl ResultLocations {
    pub fn new(
        spec_version: &str,
        spec_config: &str,
        key: &str,
        client_name: &str,
        client_version: &str,
        attempt_key: &str,
    ) -> Self {
        let prefix =
            format!("{spec_version}/{spec_config}/{key}/{client_name}/{client_version}/{attempt_key}");
        Self {
            post_state: format!("{prefix}/{POST_STATE_FILE}"),
            out_log: format!("{prefix}/{STDOUT_LOG_FILE}"),
            err_log: format!("{prefix}/{STDERR_LOG_FILE}"),
        }
    }

    /// Public URLs `{base}/{bucket}/{object}` for the record's `files`
    pub fn urls(&self, public_base_url: &str, bucket: &str) -> ResultFiles {
        let base = public_base_url.trim_end_matches('/');
        let url = |object: &str| format!("{base}/{bucket}/{object}");
        ResultFiles {
            post_state: url(&self.post_state),
            out_log: url(&self.out_log),
            err_log: url(&self.err_log),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultPublisher {
    store: Arc<dyn ObjectStore>,
    messaging: Arc<MessagingProvider>,
    results_queue: String,
    results_bucket: String,
    public_base_url: String,
    client_name: String,
    client_version: String,
    storage_timeout: Duration,
    publish_timeout: Duration,
}

impl ResultPublisher {
    pub fn new(
        config: &WorkerConfig,
        store: Arc<dyn ObjectStore>,
        messaging: Arc<MessagingProvider>,
    ) -> Self {
        Self {
            store,
            messaging,
            results_queue: config.results_queue_name(),
            results_bucket: config.storage.results_bucket.clone(),
            public_base_url: config.storage.public_base_url.clone(),
            client_name: config.worker.client_name.clone(),
            client_version: config.worker.client_version.clone(),
            storage_timeout: config.storage_timeout(),
            publish_timeout: config.publish_timeout(),
        }
    }

    pub fn results_queue(&self) -> &str {
        &self.results_queue
    }

    pub fn locations(&self, attempt: &Attempt) -> ResultLocations {
        ResultLocations::new(
            &attempt.task.spec_version,
            &attempt.task.spec_config,
            &attempt.task.key,
            &self.client_name,
            &self.client_version,
            &attempt.attempt_key,
        )
    }

    /// Upload artifacts, then emit the result record
    pub async fn publish(
        &self,
        attempt: &Attempt,
        outcome: &ExecutionOutcome,
    ) -> Result<ResultRecord, PublishError> {
        let locations = self.locations(attempt);
        let post_state_path = attempt.staging_path.join(POST_STATE_FILE);

        let (post_state, out_log, err_log) = tokio::join!(
            self.upload_post_state(&post_state_path, &locations.post_state),
            self.upload_log(&locations.out_log, &outcome.stdout),
            self.upload_log(&locations.err_log, &outcome.stderr),
        );
        let uploaded = ResultUploads {
            post_state,
            out_log,
            err_log,
        };

        let record = ResultRecord {
            success: outcome.success,
            post_hash: format_digest(outcome.output_digest.as_ref()),
            client_name: self.client_name.clone(),
            client_version: self.client_version.clone(),
            key: attempt.task.key.clone(),
            files: locations.urls(&self.public_base_url, &self.results_bucket),
            uploaded,
        };

        self.emit(&record).await?;

        info!(
            key = %attempt.task.key,
            attempt_key = %attempt.attempt_key,
            success = record.success,
            post_hash = ?record.post_hash,
            queue = %self.results_queue,
            "Result record emitted"
        );

        Ok(record)
    }

    async fn upload_post_state(&self, path: &Path, object: &str) -> bool {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(object = %object, "No post-state to upload");
                return false;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot check post-state");
                return false;
            }
        }

        let result = with_timeout(
            "upload",
            self.storage_timeout,
            self.store.upload_file(&self.results_bucket, object, path),
        )
        .await
        .map(|_| ());
        self.log_upload(object, result)
    }

    async fn upload_log(&self, object: &str, data: &[u8]) -> bool {
        let result = with_timeout(
            "upload",
            self.storage_timeout,
            self.store
                .upload_bytes(&self.results_bucket, object, data.to_vec()),
        )
        .await;
        self.log_upload(object, result)
    }

    fn log_upload(&self, object: &str, result: StorageResult<()>) -> bool {
        match result {
            Ok(()) => {
                debug!(bucket = %self.results_bucket, object = %object, "Uploaded result artifact");
                true
            }
            Err(e) => {
                warn!(
                    bucket = %self.results_bucket,
                    object = %object,
                    error = %e,
                    "Failed to upload result artifact"
                );
                false
            }
        }
    }

    async fn emit(&self, record: &ResultRecord) -> Result<(), PublishError> {
        let payload = serde_json::to_value(record).map_err(|e| PublishError::Serialization {
            message: e.to_string(),
        })?;

        match tokio::time::timeout(
            self.publish_timeout,
            self.messaging.send_message(&self.results_queue, &payload),
        )
        .await
        {
            Ok(Ok(message_id)) => {
                debug!(queue = %self.results_queue, message_id = %message_id, "Result record sent");
                Ok(())
            }
            Ok(Err(source)) => Err(PublishError::Emit {
                queue: self.results_queue.clone(),
                source,
            }),
            Err(_) => Err(PublishError::Timeout {
                queue: self.results_queue.clone(),
                timeout_seconds: self.publish_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_locations_layout() {
        let locations = ResultLocations::new("v0.8.3", "minimal", "k1", "zrnt", "v0.9.0_abc", "a1");
        assert_eq!(
            locations.post_state,
            "v0.8.3/minimal/k1/zrnt/v0.9.0_abc/a1/post.ssz"
        );
        assert_eq!(
            locations.out_log,
            "v0.8.3/minimal/k1/zrnt/v0.9.0_abc/a1/std_out_log.txt"
        );
        assert_eq!(
            locations.err_log,
            "v0.8.3/minimal/k1/zrnt/v0.9.0_abc/a1/std_err_log.txt"
        );
    }

    #[test]
    fn test_urls_map_each_file_to_its_own_object() {
        let locations = ResultLocations::new("v", "c", "k", "zrnt", "1", "a");
        let files = locations.urls("https://storage.googleapis.com/", "results-zrnt");

        assert_eq!(
            files.post_state,
            "https://storage.googleapis.com/results-zrnt/v/c/k/zrnt/1/a/post.ssz"
        );
        assert!(files.out_log.ends_with("/std_out_log.txt"));
        assert!(files.err_log.ends_with("/std_err_log.txt"));
    }

    #[test]
    fn test_distinct_attempts_never_share_locations() {
        let a = ResultLocations::new("v", "c", "k", "zrnt", "1", "a1");
        let b = ResultLocations::new("v", "c", "k", "zrnt", "1", "a2");
        assert_ne!(a.post_state, b.post_state);
        assert_ne!(a.out_log, b.out_log);
        assert_ne!(a.err_log, b.err_log);
    }
}
