//! # PGMQ Messaging Service
//!
//! PostgreSQL Message Queue implementation via the pgmq crate.
//!
//! - **Visibility Timeout**: built-in PGMQ visibility semantics drive redelivery
//! - **Ack**: deletes the message
//! - **Nack**: `pgmq.set_vt(.., delay)` to redeliver, archive otherwise

use std::time::Duration;

use async_trait::async_trait;
use ::pgmq::PGMQueue;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::messaging::service::traits::{MessagingService, QueueMessage};
use crate::messaging::service::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle, Redelivery,
};
use crate::messaging::MessagingError;

/// PGMQ-based messaging service implementation
///
/// # Example
///
/// ```ignore
/// let service = PgmqMessagingService::new("postgresql://localhost/transitions").await?;
/// service.ensure_queue("results_eth2team").await?;
/// let messages = service
///     .receive_messages::<serde_json::Value>("v0_8_3_minimal_eth2team_poc", 4, Duration::from_secs(900))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct PgmqMessagingService {
    pgmq: PGMQueue,
}

impl PgmqMessagingService {
    /// Create a new PGMQ messaging service from database URL
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::connection(e.to_string()))?;
        Ok(Self { pgmq })
    }

    /// Create a new PGMQ messaging service with an existing connection pool
    pub async fn new_with_pool(pool: PgPool) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self { pgmq }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pgmq.connection
    }

    async fn queue_exists(&self, queue_name: &str) -> Result<bool, MessagingError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM pgmq.list_queues() WHERE queue_name = $1) AS present",
        )
        .bind(queue_name)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get::<bool, _>("present")?)
    }
}

#[async_trait]
impl MessagingService for PgmqMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::queue_creation(queue_name, e.to_string()))
    }

    async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError> {
        let mut report = QueueHealthReport::new();

        for queue_name in queue_names {
            match self.queue_exists(queue_name).await {
                Ok(true) => report.add_healthy(queue_name),
                Ok(false) => report.add_missing(queue_name),
                Err(e) => report.add_error(queue_name, e.to_string()),
            }
        }

        Ok(report)
    }

    async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        // pgmq stores jsonb, so go through a JSON value
        let json_value: serde_json::Value = serde_json::from_slice(&message.to_bytes()?)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;

        let msg_id = self
            .pgmq
            .send(queue_name, &json_value)
            .await
            .map_err(|e| MessagingError::send(queue_name, e.to_string()))?;

        debug!(queue = %queue_name, msg_id = msg_id, "Message sent");
        Ok(MessageId::from(msg_id))
    }

    async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let vt_seconds = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let limit = i32::try_from(max_messages).unwrap_or(i32::MAX);

        let messages = self
            .pgmq
            .read_batch::<serde_json::Value>(queue_name, Some(vt_seconds), limit)
            .await
            .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?
            .unwrap_or_default();

        let mut result = Vec::with_capacity(messages.len());

        for msg in messages {
            let bytes = serde_json::to_vec(&msg.message)?;
            let deserialized = T::from_bytes(&bytes)?;

            result.push(QueuedMessage::new(
                ReceiptHandle::from(msg.msg_id),
                deserialized,
                u32::try_from(msg.read_ct).unwrap_or(0),
                msg.enqueued_at,
            ));
        }

        Ok(result)
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let message_id = receipt_handle.message_id().value();

        self.pgmq
            .delete(queue_name, message_id)
            .await
            .map_err(|e| MessagingError::ack(queue_name, message_id, e.to_string()))?;
        Ok(())
    }

    async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        redelivery: Redelivery,
    ) -> Result<(), MessagingError> {
        let message_id = receipt_handle.message_id().value();

        match redelivery {
            Redelivery::After(delay) => {
                // PGMQ has no nack; resetting the visibility timeout to the
                // delay hands the message back once it passes
                let delay_seconds = i32::try_from(delay.as_secs()).unwrap_or(i32::MAX);
                sqlx::query("SELECT msg_id FROM pgmq.set_vt($1::text, $2::bigint, $3::integer)")
                    .bind(queue_name)
                    .bind(message_id)
                    .bind(delay_seconds)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(|e| MessagingError::nack(queue_name, message_id, e.to_string()))?;
            }
            Redelivery::Archive => {
                self.pgmq
                    .archive(queue_name, message_id)
                    .await
                    .map_err(|e| MessagingError::nack(queue_name, message_id, e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        if !self.queue_exists(queue_name).await? {
            return Err(MessagingError::queue_not_found(queue_name));
        }

        let row = sqlx::query(
            "SELECT queue_length, oldest_msg_age_sec FROM pgmq.metrics($1::text)",
        )
        .bind(queue_name)
        .fetch_one(self.pool())
        .await?;

        let queue_length: i64 = row.try_get("queue_length")?;
        let oldest_age: Option<i32> = row.try_get("oldest_msg_age_sec")?;

        let mut stats = QueueStats::new(queue_name, u64::try_from(queue_length).unwrap_or(0));
        if let Some(age) = oldest_age.and_then(|secs| u64::try_from(secs).ok()) {
            stats = stats.with_oldest_message_age(Duration::from_secs(age));
        }

        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| true)
            .map_err(|e| MessagingError::health_check(e.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
