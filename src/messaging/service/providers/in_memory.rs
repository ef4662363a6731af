//! # In-Memory Messaging Service
//!
//! Thread-safe in-memory queue implementation for testing and development.
//!
//! - **Visibility Timeout**: Messages become invisible after receive, re-visible after timeout
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::messaging::service::traits::{MessagingService, QueueMessage};
use crate::messaging::service::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle, Redelivery,
};
use crate::messaging::MessagingError;

/// In-memory message with visibility tracking
#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: MessageId,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now)
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

impl InMemoryQueuedMessage {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.visible_at.map(|vt| vt <= now).unwrap_or(true)
    }
}

#[derive(Debug)]
struct InMemoryQueue {
    /// Live messages in FIFO order
    messages: VecDeque<InMemoryQueuedMessage>,
    /// Messages nacked with `Redelivery::Archive`
    archived: Vec<InMemoryQueuedMessage>,
    next_id: i64,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            archived: Vec::new(),
            next_id: 1,
        }
    }

    fn position(&self, receipt_handle: &ReceiptHandle) -> Result<usize, MessagingError> {
        let message_id = receipt_handle.message_id();
        self.messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id))
    }
}

/// In-memory messaging service
///
/// ```rust
/// use transition_worker::messaging::service::{InMemoryMessagingService, MessagingService};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = InMemoryMessagingService::new();
/// service.ensure_queue("test_queue").await?;
/// service.send_message("test_queue", &serde_json::json!({"key": "value"})).await?;
///
/// let messages = service
///     .receive_messages::<serde_json::Value>("test_queue", 10, Duration::from_secs(30))
///     .await?;
/// assert_eq!(messages.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryMessagingService {
    queues: RwLock<HashMap<String, InMemoryQueue>>,
}

impl Default for InMemoryMessagingService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Create with pre-initialized queues
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let queues = queue_names
            .iter()
            .map(|name| (name.to_string(), InMemoryQueue::new()))
            .collect();
        Self {
            queues: RwLock::new(queues),
        }
    }

    /// Number of live messages (visible and in flight) in a queue
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Number of messages a consumer could receive right now
    pub async fn visible_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        let now = Utc::now();
        queues
            .get(queue_name)
            .map(|q| q.messages.iter().filter(|m| m.is_visible(now)).count())
            .unwrap_or(0)
    }

    /// Number of archived messages
    pub async fn archived_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.archived.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(InMemoryQueue::new);
        Ok(())
    }

    async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError> {
        let queues = self.queues.read().await;
        let mut report = QueueHealthReport::new();

        for name in queue_names {
            if queues.contains_key(name) {
                report.add_healthy(name);
            } else {
                report.add_missing(name);
            }
        }

        Ok(report)
    }

    async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        let payload = message.to_bytes()?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let id = MessageId::from(queue.next_id);
        queue.next_id += 1;

        queue.messages.push_back(InMemoryQueuedMessage {
            id,
            payload,
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });

        Ok(id)
    }

    async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let timeout = chrono::Duration::from_std(visibility_timeout)
            .map_err(|e| MessagingError::internal(format!("visibility timeout: {e}")))?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let visible_until = now + timeout;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if !msg.is_visible(now) {
                continue;
            }

            let deserialized = T::from_bytes(&msg.payload)?;

            msg.visible_at = Some(visible_until);
            msg.receive_count += 1;

            received.push(QueuedMessage::new(
                ReceiptHandle::from(msg.id),
                deserialized,
                msg.receive_count,
                msg.enqueued_at,
            ));
        }

        Ok(received)
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue.position(receipt_handle)?;
        queue.messages.remove(pos);
        Ok(())
    }

    async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        redelivery: Redelivery,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue.position(receipt_handle)?;
        match redelivery {
            Redelivery::After(delay) if delay.is_zero() => {
                queue.messages[pos].visible_at = None;
            }
            Redelivery::After(delay) => {
                let delay = chrono::Duration::from_std(delay)
                    .map_err(|e| MessagingError::internal(format!("redelivery delay: {e}")))?;
                queue.messages[pos].visible_at = Some(Utc::now() + delay);
            }
            Redelivery::Archive => {
                if let Some(msg) = queue.messages.remove(pos) {
                    queue.archived.push(msg);
                }
            }
        }
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let in_flight_count = queue
            .messages
            .iter()
            .filter(|m| !m.is_visible(now))
            .count() as u64;

        let mut stats = QueueStats::new(queue_name, queue.messages.len() as u64)
            .with_in_flight_count(in_flight_count);

        if let Some(age) = queue
            .messages
            .front()
            .and_then(|m| (now - m.enqueued_at).to_std().ok())
        {
            stats = stats.with_oldest_message_age(age);
        }

        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
