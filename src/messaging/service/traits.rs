//! # Messaging Service Traits
//!
//! Core trait definitions for provider-agnostic messaging.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle, Redelivery,
};
use super::MessagingError;

/// Core messaging service trait - provider-agnostic operations
///
/// The subscription transport only has to offer:
///
/// - Queue creation (idempotent)
/// - Message send/receive with visibility timeout
/// - Message acknowledgment (ack/nack)
/// - Queue statistics for startup logging
///
/// A received message that is neither acked nor nacked becomes visible again
/// once its visibility timeout expires, which is how redelivery after a crash
/// happens.
#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Create a queue if it doesn't exist (idempotent)
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError>;

    /// Bulk queue creation
    ///
    /// Default implementation calls `ensure_queue` for each name.
    async fn ensure_queues(&self, queue_names: &[String]) -> Result<(), MessagingError> {
        for queue_name in queue_names {
            self.ensure_queue(queue_name).await?;
        }
        Ok(())
    }

    /// Verify expected queues exist (startup health check)
    async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError>;

    /// Send a message to a queue
    async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError>;

    /// Receive up to `max_messages`, hiding them from other consumers for
    /// `visibility_timeout`
    async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError>;

    /// Acknowledge successful processing (delete message)
    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError>;

    /// Negative acknowledge: hide the message for a delay before it is
    /// offered again, or archive it out of the live queue
    async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        redelivery: Redelivery,
    ) -> Result<(), MessagingError>;

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError>;

    /// Health check - verify the messaging backend is reachable
    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Message serialization contract
///
/// Types implementing this trait can be sent through the messaging system.
pub trait QueueMessage: Send + Sync + Clone + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError>
    where
        Self: Sized;
}

/// Blanket implementation for types that implement Serialize + DeserializeOwned
///
/// This provides JSON serialization by default for any serde-compatible type.
impl<T> QueueMessage for T
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + Clone + 'static,
{
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes)
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}
