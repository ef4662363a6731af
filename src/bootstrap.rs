//! # Worker Bootstrap
//!
//! Wires configuration, the messaging provider and the object store into a
//! running [`WorkerPool`].
//!
//! Startup order:
//!
//! 1. Validate configuration
//! 2. Connect the messaging provider and open the object store
//! 3. Create or verify the subscription and results queues
//! 4. Build the coordinator and start polling
//!
//! Any failure before polling starts is fatal and returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{MessagingProviderKind, StorageProviderKind, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::messaging::{InMemoryMessagingService, MessagingProvider, PgmqMessagingService};
use crate::storage::{FilesystemObjectStore, InMemoryObjectStore, ObjectStore};
use crate::worker::{PoolStatsSnapshot, TaskCoordinator, WorkerHandle, WorkerPool};

/// Handle to a bootstrapped worker
#[derive(Debug)]
pub struct WorkerSystemHandle {
    pub config: Arc<WorkerConfig>,
    pub messaging: Arc<MessagingProvider>,
    pub store: Arc<dyn ObjectStore>,
    pool: WorkerHandle,
}

impl WorkerSystemHandle {
    pub fn subscription_queue(&self) -> &str {
        self.pool.queue_name()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.pool.stats()
    }

    /// Stop polling and drain in-flight attempts for up to `grace`
    pub async fn stop(self, grace: Duration) -> PoolStatsSnapshot {
        info!(grace_secs = grace.as_secs(), "Stopping worker system");
        let summary = self.pool.shutdown(grace).await;
        info!(
            received = summary.received,
            acknowledged = summary.acknowledged,
            rejected = summary.rejected,
            transport_errors = summary.transport_errors,
            abandoned = summary.abandoned,
            "Worker system stopped"
        );
        summary
    }
}

#[derive(Debug)]
pub struct WorkerBootstrap;

impl WorkerBootstrap {
    /// Build providers from configuration and start the worker
    pub async fn bootstrap(config: Arc<WorkerConfig>) -> Result<WorkerSystemHandle> {
        config.validate()?;

        let messaging = Arc::new(Self::create_messaging(&config).await?);
        let store = Self::create_store(&config);

        Self::bootstrap_with(config, messaging, store).await
    }

    /// Start the worker on already constructed providers
    pub async fn bootstrap_with(
        config: Arc<WorkerConfig>,
        messaging: Arc<MessagingProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<WorkerSystemHandle> {
        info!(
            worker_id = %config.worker.worker_id,
            client_name = %config.worker.client_name,
            client_version = %config.worker.client_version,
            spec_version = %config.worker.spec_version,
            spec_config = %config.worker.spec_config,
            messaging = messaging.provider_name(),
            storage = store.provider_name(),
            "Bootstrapping transition worker"
        );

        Self::prepare_queues(&config, &messaging).await?;

        let coordinator = Arc::new(TaskCoordinator::new(
            config.clone(),
            store.clone(),
            messaging.clone(),
        )?);
        let pool = WorkerPool::new(&config, coordinator, messaging.clone()).start();

        Ok(WorkerSystemHandle {
            config,
            messaging,
            store,
            pool,
        })
    }

    async fn create_messaging(config: &WorkerConfig) -> Result<MessagingProvider> {
        match config.messaging.provider {
            MessagingProviderKind::Pgmq => {
                let url = config.messaging.database_url.as_deref().ok_or_else(|| {
                    WorkerError::startup("messaging.database_url is required for pgmq")
                })?;
                Ok(PgmqMessagingService::new(url).await?.into())
            }
            MessagingProviderKind::InMemory => {
                warn!("Using in-memory messaging; messages do not survive a restart");
                Ok(InMemoryMessagingService::new().into())
            }
        }
    }

    fn create_store(config: &WorkerConfig) -> Arc<dyn ObjectStore> {
        match config.storage.provider {
            StorageProviderKind::Filesystem => {
                Arc::new(FilesystemObjectStore::new(config.storage.root.clone()))
            }
            StorageProviderKind::InMemory => Arc::new(InMemoryObjectStore::new()),
        }
    }

    async fn prepare_queues(config: &WorkerConfig, messaging: &MessagingProvider) -> Result<()> {
        let queues = vec![config.subscription_queue_name(), config.results_queue_name()];

        if !messaging.health_check().await? {
            return Err(WorkerError::startup(format!(
                "{} messaging backend is unhealthy",
                messaging.provider_name()
            )));
        }

        if config.messaging.create_queues {
            messaging.ensure_queues(&queues).await?;
        } else {
            let report = messaging.verify_queues(&queues).await?;
            if !report.is_healthy() {
                return Err(WorkerError::startup(format!("queues unavailable: {report}")));
            }
        }

        let stats =
            futures::future::join_all(queues.iter().map(|q| messaging.queue_stats(q))).await;
        for (queue, stats) in queues.iter().zip(stats) {
            match stats {
                Ok(stats) => info!(
                    queue = %queue,
                    messages = stats.message_count,
                    in_flight = ?stats.in_flight_count,
                    oldest_age_secs = ?stats.oldest_message_age.map(|d| d.as_secs()),
                    "Queue ready"
                ),
                Err(e) => warn!(queue = %queue, error = %e, "Queue stats unavailable"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.messaging.provider = MessagingProviderKind::InMemory;
        config.storage.provider = StorageProviderKind::InMemory;
        config
    }

    #[tokio::test]
    async fn test_missing_queues_fail_startup() {
        let config = Arc::new(in_memory_config());
        let err = WorkerBootstrap::bootstrap(config).await.unwrap_err();
        match err {
            WorkerError::Startup { message } => assert!(message.contains("missing")),
            other => panic!("expected startup error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_queues_then_stop() {
        let mut config = in_memory_config();
        config.messaging.create_queues = true;
        config.messaging.polling_interval_ms = 10;

        let handle = WorkerBootstrap::bootstrap(Arc::new(config)).await.unwrap();
        assert_eq!(handle.subscription_queue(), "v0_8_3_minimal_eth2team_poc");

        let summary = handle.stop(Duration::from_secs(1)).await;
        assert_eq!(summary, PoolStatsSnapshot::default());
    }
}
