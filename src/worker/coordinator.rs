//! # Task Coordinator
//!
//! Drives one delivered message through its lifecycle:
//!
//! ```text
//! Received → Decoded → Staged → Executed → Fingerprinted → Published → Acknowledged
//!     └──────────┴─────────┴─────────┴──────────────────────────┴──────→ Rejected
//! ```
//!
//! | Failure                         | Outcome                         |
//! |---------------------------------|---------------------------------|
//! | descriptor does not decode      | Rejected                        |
//! | spec version/config not ours    | Acknowledged, nothing executed  |
//! | staging or input fetch fails    | Rejected                        |
//! | command cannot launch/times out | Rejected, no record             |
//! | command exits non-zero          | record with `success: false`    |
//! | result record not emitted       | Rejected                        |
//!
//! The staging directory is released (when `staging.cleanup` is set) on
//! every path after allocation, before the disposition is returned. The
//! coordinator never retries; redelivery is the transport's job.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{DecodeError, WorkerError};
use crate::messaging::{MessagingProvider, QueuedMessage, ResultRecord, TransitionMessage};
use crate::storage::ObjectStore;
use crate::worker::attempt::{new_attempt_key, Attempt, AttemptReport, AttemptState};
use crate::worker::executor::{CommandTemplate, Executor};
use crate::worker::fingerprint;
use crate::worker::inputs::InputMaterializer;
use crate::worker::publisher::ResultPublisher;
use crate::worker::staging::StagingManager;

#[derive(Debug)]
pub struct TaskCoordinator {
    config: Arc<WorkerConfig>,
    staging: StagingManager,
    inputs: InputMaterializer,
    executor: Executor,
    publisher: ResultPublisher,
}

/// Tracks the current state of one attempt and logs each transition
struct StateTracker<'a> {
    key: &'a str,
    attempt_key: &'a str,
    state: AttemptState,
}

impl<'a> StateTracker<'a> {
    fn new(key: &'a str, attempt_key: &'a str) -> Self {
        Self {
            key,
            attempt_key,
            state: AttemptState::Decoded,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        debug!(
            key = %self.key,
            attempt_key = %self.attempt_key,
            from = %self.state,
            to = %next,
            "Attempt state transition"
        );
        self.state = next;
    }
}

impl TaskCoordinator {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: Arc<dyn ObjectStore>,
        messaging: Arc<MessagingProvider>,
    ) -> Result<Self, WorkerError> {
        let template = CommandTemplate::parse(&config.executor.command)?;
        Ok(Self {
            staging: StagingManager::new(config.staging_root()),
            inputs: InputMaterializer::new(
                store.clone(),
                config.storage.inputs_bucket.clone(),
                config.storage_timeout(),
            ),
            executor: Executor::new(template, config.execution_timeout()),
            publisher: ResultPublisher::new(&config, store, messaging),
            config,
        })
    }

    pub fn staging(&self) -> &StagingManager {
        &self.staging
    }

    /// Process one delivery end to end and decide its disposition
    pub async fn process(&self, delivery: &QueuedMessage<Value>) -> AttemptReport {
        debug!(
            receipt_handle = %delivery.receipt_handle,
            receive_count = delivery.receive_count,
            enqueued_at = %delivery.enqueued_at,
            state = %AttemptState::Received,
            "Processing delivery"
        );

        let task = match TransitionMessage::from_json(delivery.message.clone()) {
            Ok(task) => task,
            Err(e) => {
                let err = DecodeError::from(e);
                warn!(
                    receipt_handle = %delivery.receipt_handle,
                    receive_count = delivery.receive_count,
                    error = %err,
                    "Rejecting undecodable task descriptor"
                );
                return AttemptReport::rejected(None, None);
            }
        };

        let worker = &self.config.worker;
        if !task.targets(&worker.spec_version, &worker.spec_config) {
            warn!(
                key = %task.key,
                spec_version = %task.spec_version,
                spec_config = %task.spec_config,
                expected_spec_version = %worker.spec_version,
                expected_spec_config = %worker.spec_config,
                "Ignoring task for a different spec target"
            );
            return AttemptReport::acknowledged(Some(task.key), None, None);
        }

        let attempt_key = new_attempt_key();
        let key = task.key.clone();
        let mut tracker = StateTracker::new(&key, &attempt_key);

        info!(
            key = %key,
            attempt_key = %attempt_key,
            blocks = task.blocks,
            receive_count = delivery.receive_count,
            "Starting attempt"
        );

        let staging_path = match self.staging.allocate(&key, &attempt_key).await {
            Ok(path) => path,
            Err(e) => {
                error!(key = %key, attempt_key = %attempt_key, error = %e, "Staging failed");
                tracker.advance(AttemptState::Rejected);
                return AttemptReport::rejected(Some(key), Some(attempt_key));
            }
        };

        let attempt = Attempt {
            task,
            attempt_key: attempt_key.clone(),
            staging_path,
        };

        let result = self.run_attempt(&attempt, &mut tracker).await;

        if self.config.staging.cleanup {
            self.release(&attempt.staging_path).await;
        }

        match result {
            Ok(record) => {
                tracker.advance(AttemptState::Acknowledged);
                AttemptReport::acknowledged(Some(key), Some(attempt_key), Some(record))
            }
            Err(e) => {
                error!(
                    key = %key,
                    attempt_key = %attempt_key,
                    state = %tracker.state,
                    error = %e,
                    "Attempt failed, rejecting message"
                );
                tracker.advance(AttemptState::Rejected);
                AttemptReport::rejected(Some(key), Some(attempt_key))
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: &Attempt,
        tracker: &mut StateTracker<'_>,
    ) -> Result<ResultRecord, WorkerError> {
        let fetched = self
            .inputs
            .materialize(&attempt.staging_path, &attempt.task)
            .await?;
        debug!(
            key = %attempt.task.key,
            attempt_key = %attempt.attempt_key,
            artifacts = fetched.len(),
            "Inputs materialized"
        );
        tracker.advance(AttemptState::Staged);

        let mut outcome = self
            .executor
            .run(&attempt.staging_path, attempt.task.blocks)
            .await?;
        info!(
            key = %attempt.task.key,
            attempt_key = %attempt.attempt_key,
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration.as_millis() as u64,
            "Transition command finished"
        );
        tracker.advance(AttemptState::Executed);

        outcome.output_digest = fingerprint::digest(&attempt.staging_path).await;
        tracker.advance(AttemptState::Fingerprinted);

        let record = self.publisher.publish(attempt, &outcome).await?;
        tracker.advance(AttemptState::Published);

        Ok(record)
    }

    async fn release(&self, path: &Path) {
        self.staging.release(path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MessagingProviderKind, StorageProviderKind};
    use crate::messaging::{InMemoryMessagingService, ReceiptHandle};
    use crate::storage::InMemoryObjectStore;
    use crate::worker::attempt::Disposition;
    use crate::worker::inputs::{artifact_names, input_object_name};
    use crate::worker::publisher::ResultLocations;
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::time::Duration;
    use tempfile::TempDir;

    const COPY_PRE_TO_POST: &str = r#"pre=""; post=""
while [ $# -gt 0 ]; do
  case "$1" in
    --pre) pre="$2"; shift 2 ;;
    --post) post="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat "$pre" > "$post"
echo "transitioned"
echo "diag" >&2
"#;

    struct Harness {
        _dir: TempDir,
        staging_root: std::path::PathBuf,
        store: Arc<InMemoryObjectStore>,
        messaging: Arc<MessagingProvider>,
        coordinator: TaskCoordinator,
        results_queue: String,
    }

    fn harness(script: &str) -> Harness {
        let dir = TempDir::new().unwrap();
        let script_path = dir.path().join("tool.sh");
        std::fs::write(&script_path, script).unwrap();
        let staging_root = dir.path().join("staging");

        let mut config = WorkerConfig::default();
        config.messaging.provider = MessagingProviderKind::InMemory;
        config.storage.provider = StorageProviderKind::InMemory;
        config.executor.command = format!("sh {}", script_path.display());
        config.executor.timeout_seconds = 30;
        config.staging.root = Some(staging_root.clone());
        let config = Arc::new(config);

        let results_queue = config.results_queue_name();
        let store = Arc::new(InMemoryObjectStore::new());
        let messaging = Arc::new(MessagingProvider::from(
            InMemoryMessagingService::with_queues(&[results_queue.as_str()]),
        ));
        let coordinator =
            TaskCoordinator::new(config, store.clone(), messaging.clone()).unwrap();

        Harness {
            _dir: dir,
            staging_root,
            store,
            messaging,
            coordinator,
            results_queue,
        }
    }

    fn task(blocks: u32) -> TransitionMessage {
        TransitionMessage {
            blocks,
            spec_version: "v0.8.3".to_string(),
            spec_config: "minimal".to_string(),
            key: "k1".to_string(),
        }
    }

    fn seed_inputs(store: &InMemoryObjectStore, task: &TransitionMessage) {
        for name in artifact_names(task.blocks) {
            let content = format!("{name}-bytes");
            store.insert(
                "muskoka-transitions",
                &input_object_name(task, &name),
                content.into_bytes(),
            );
        }
    }

    fn delivery(message: Value) -> QueuedMessage<Value> {
        QueuedMessage::new(ReceiptHandle::from(1_i64), message, 1, chrono::Utc::now())
    }

    async fn emitted_records(h: &Harness) -> Vec<ResultRecord> {
        h.messaging
            .receive_messages::<ResultRecord>(&h.results_queue, 10, Duration::from_secs(30))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect()
    }

    #[tokio::test]
    async fn test_successful_attempt_publishes_and_acknowledges() {
        let h = harness(COPY_PRE_TO_POST);
        let task = task(2);
        seed_inputs(&h.store, &task);

        let report = h
            .coordinator
            .process(&delivery(serde_json::to_value(&task).unwrap()))
            .await;

        assert_eq!(report.disposition, Disposition::Ack);
        assert_eq!(report.state, AttemptState::Acknowledged);
        let record = report.record.unwrap();
        assert!(record.success);
        let expected: [u8; 32] = Sha256::digest(b"pre.ssz-bytes").into();
        assert_eq!(
            record.post_hash,
            Some(format!("0x{}", hex::encode(expected)))
        );
        assert!(record.uploaded.post_state && record.uploaded.out_log && record.uploaded.err_log);

        let emitted = emitted_records(&h).await;
        assert_eq!(emitted, vec![record]);

        // Attempt directory and its emptied key directory released
        let attempt_key = report.attempt_key.unwrap();
        let staged = h.coordinator.staging().path_for("k1", &attempt_key).unwrap();
        assert!(!staged.exists());
        assert!(staged.starts_with(&h.staging_root));
        assert_eq!(std::fs::read_dir(&h.staging_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_descriptor_is_rejected() {
        let h = harness(COPY_PRE_TO_POST);

        let report = h
            .coordinator
            .process(&delivery(json!({"blocks": "two", "key": "k1"})))
            .await;

        assert_eq!(report.disposition, Disposition::Reject);
        assert!(report.key.is_none());
        assert!(report.record.is_none());
        assert!(h.store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_spec_target_is_acknowledged_without_work() {
        let h = harness(COPY_PRE_TO_POST);
        let mut task = task(1);
        task.spec_config = "mainnet".to_string();

        let report = h
            .coordinator
            .process(&delivery(serde_json::to_value(&task).unwrap()))
            .await;

        assert_eq!(report.disposition, Disposition::Ack);
        assert!(report.attempt_key.is_none());
        assert!(report.record.is_none());
        assert!(h.store.requests().is_empty());
        assert!(emitted_records(&h).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_rejects_without_record() {
        let h = harness(COPY_PRE_TO_POST);
        let task = task(1);
        h.store.insert(
            "muskoka-transitions",
            &input_object_name(&task, "pre.ssz"),
            b"pre".to_vec(),
        );

        let report = h
            .coordinator
            .process(&delivery(serde_json::to_value(&task).unwrap()))
            .await;

        assert_eq!(report.disposition, Disposition::Reject);
        assert_eq!(report.key.as_deref(), Some("k1"));
        assert!(emitted_records(&h).await.is_empty());
        let attempt_key = report.attempt_key.unwrap();
        let staged = h.coordinator.staging().path_for("k1", &attempt_key).unwrap();
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_failed_command_still_publishes_record() {
        let h = harness("echo boom >&2\nexit 3\n");
        let task = task(0);
        seed_inputs(&h.store, &task);

        let report = h
            .coordinator
            .process(&delivery(serde_json::to_value(&task).unwrap()))
            .await;

        assert_eq!(report.disposition, Disposition::Ack);
        let record = report.record.unwrap();
        assert!(!record.success);
        assert_eq!(record.post_hash, None);
        assert!(!record.uploaded.post_state);
        assert!(record.uploaded.err_log);

        let locations = ResultLocations::new(
            "v0.8.3",
            "minimal",
            "k1",
            "eth2team",
            "v0.1.2_1a2b3c4",
            report.attempt_key.as_deref().unwrap(),
        );
        assert_eq!(
            h.store.get("results-eth2team", &locations.err_log).unwrap(),
            b"boom\n"
        );
    }
}
