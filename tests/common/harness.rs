use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use transition_worker::config::{MessagingProviderKind, StorageProviderKind, WorkerConfig};
use transition_worker::messaging::{
    InMemoryMessagingService, MessagingProvider, QueuedMessage, ReceiptHandle, ResultRecord,
    TransitionMessage,
};
use transition_worker::storage::{InMemoryObjectStore, ObjectStore};
use transition_worker::worker::inputs::{artifact_names, input_object_name};
use transition_worker::worker::TaskCoordinator;

pub const SPEC_VERSION: &str = "v1";
pub const SPEC_CONFIG: &str = "minimal";

/// In-memory queues and store, a temp staging root and a stub tool
pub struct WorkerHarness {
    pub dir: TempDir,
    pub config: Arc<WorkerConfig>,
    pub store: Arc<InMemoryObjectStore>,
    pub messaging: Arc<MessagingProvider>,
}

impl WorkerHarness {
    pub fn new(tool_script: &str) -> Self {
        Self::with_config(tool_script, |_| {})
    }

    pub fn with_config(tool_script: &str, customize: impl FnOnce(&mut WorkerConfig)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let script = dir.path().join("transition-tool.sh");
        std::fs::write(&script, tool_script).expect("write stub tool");

        let mut config = WorkerConfig::default();
        config.worker.spec_version = SPEC_VERSION.to_string();
        config.worker.spec_config = SPEC_CONFIG.to_string();
        config.messaging.provider = MessagingProviderKind::InMemory;
        config.messaging.polling_interval_ms = 20;
        config.messaging.visibility_timeout_seconds = 60;
        config.messaging.reject_delay_seconds = 0;
        config.storage.provider = StorageProviderKind::InMemory;
        config.executor.command = format!("sh {}", script.display());
        config.executor.timeout_seconds = 30;
        config.staging.root = Some(dir.path().join("staging"));
        customize(&mut config);

        let messaging = InMemoryMessagingService::with_queues(&[
            config.subscription_queue_name().as_str(),
            config.results_queue_name().as_str(),
        ]);

        Self {
            dir,
            config: Arc::new(config),
            store: Arc::new(InMemoryObjectStore::new()),
            messaging: Arc::new(messaging.into()),
        }
    }

    pub fn coordinator(&self) -> TaskCoordinator {
        TaskCoordinator::new(self.config.clone(), self.object_store(), self.messaging.clone())
            .expect("coordinator")
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> &InMemoryMessagingService {
        self.messaging.as_in_memory().expect("in-memory messaging")
    }

    pub fn subscription_queue(&self) -> String {
        self.config.subscription_queue_name()
    }

    pub fn results_queue(&self) -> String {
        self.config.results_queue_name()
    }

    pub fn staging_root(&self) -> PathBuf {
        self.config.staging_root()
    }

    pub fn inputs_bucket(&self) -> &str {
        &self.config.storage.inputs_bucket
    }

    pub fn results_bucket(&self) -> &str {
        &self.config.storage.results_bucket
    }

    /// Store `pre.ssz` and every block; each artifact's bytes are its name
    pub fn seed_inputs(&self, task: &TransitionMessage) {
        for name in artifact_names(task.blocks) {
            self.seed_artifact(task, &name, format!("{name} bytes").into_bytes());
        }
    }

    pub fn seed_artifact(&self, task: &TransitionMessage, name: &str, bytes: Vec<u8>) {
        self.store
            .insert(self.inputs_bucket(), &input_object_name(task, name), bytes);
    }

    pub async fn enqueue(&self, message: &Value) {
        self.messaging
            .send_message(&self.subscription_queue(), message)
            .await
            .expect("enqueue task");
    }

    /// Pull every emitted result record off the results queue
    pub async fn emitted_records(&self) -> Vec<ResultRecord> {
        self.messaging
            .receive_messages::<ResultRecord>(&self.results_queue(), 100, Duration::from_secs(60))
            .await
            .expect("read results queue")
            .into_iter()
            .map(|m| m.message)
            .collect()
    }

    /// Attempt directories left under the staging root
    pub fn staged_attempts(&self) -> usize {
        let Ok(keys) = std::fs::read_dir(self.staging_root()) else {
            return 0;
        };
        keys.filter_map(Result::ok)
            .filter_map(|key| std::fs::read_dir(key.path()).ok())
            .map(|attempts| attempts.count())
            .sum()
    }
}

pub fn descriptor(key: &str, blocks: u32) -> TransitionMessage {
    TransitionMessage {
        blocks,
        spec_version: SPEC_VERSION.to_string(),
        spec_config: SPEC_CONFIG.to_string(),
        key: key.to_string(),
    }
}

pub fn delivery(message: Value) -> QueuedMessage<Value> {
    QueuedMessage::new(ReceiptHandle::from(1_i64), message, 1, chrono::Utc::now())
}

pub fn delivery_of(task: &TransitionMessage) -> QueuedMessage<Value> {
    delivery(serde_json::to_value(task).expect("serialize descriptor"))
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
