//! # Messaging Provider Enum
//!
//! Enum dispatch for messaging providers. `MessagingService` has generic
//! methods and cannot be a trait object, so components hold an
//! `Arc<MessagingProvider>` instead.

use std::time::Duration;

use super::providers::{InMemoryMessagingService, PgmqMessagingService};
use super::traits::{MessagingService, QueueMessage};
use super::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle, Redelivery,
};
use super::MessagingError;

/// Provider enum for zero-cost dispatch
///
/// # Variants
///
/// - `Pgmq` - PostgreSQL Message Queue
/// - `InMemory` - In-memory queue for tests and local development
#[derive(Debug)]
pub enum MessagingProvider {
    Pgmq(PgmqMessagingService),
    InMemory(InMemoryMessagingService),
}

impl MessagingProvider {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Pgmq(s) => s.provider_name(),
            Self::InMemory(s) => s.provider_name(),
        }
    }

    pub async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ensure_queue(queue_name).await,
            Self::InMemory(s) => s.ensure_queue(queue_name).await,
        }
    }

    pub async fn ensure_queues(&self, queue_names: &[String]) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ensure_queues(queue_names).await,
            Self::InMemory(s) => s.ensure_queues(queue_names).await,
        }
    }

    pub async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError> {
        match self {
            Self::Pgmq(s) => s.verify_queues(queue_names).await,
            Self::InMemory(s) => s.verify_queues(queue_names).await,
        }
    }

    pub async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        match self {
            Self::Pgmq(s) => s.send_message(queue_name, message).await,
            Self::InMemory(s) => s.send_message(queue_name, message).await,
        }
    }

    pub async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        match self {
            Self::Pgmq(s) => {
                s.receive_messages(queue_name, max_messages, visibility_timeout)
                    .await
            }
            Self::InMemory(s) => {
                s.receive_messages(queue_name, max_messages, visibility_timeout)
                    .await
            }
        }
    }

    pub async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ack_message(queue_name, receipt_handle).await,
            Self::InMemory(s) => s.ack_message(queue_name, receipt_handle).await,
        }
    }

    pub async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        redelivery: Redelivery,
    ) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.nack_message(queue_name, receipt_handle, redelivery).await,
            Self::InMemory(s) => s.nack_message(queue_name, receipt_handle, redelivery).await,
        }
    }

    pub async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        match self {
            Self::Pgmq(s) => s.queue_stats(queue_name).await,
            Self::InMemory(s) => s.queue_stats(queue_name).await,
        }
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        match self {
            Self::Pgmq(s) => s.health_check().await,
            Self::InMemory(s) => s.health_check().await,
        }
    }

    /// Access the in-memory backend, if that is the active provider
    pub fn as_in_memory(&self) -> Option<&InMemoryMessagingService> {
        match self {
            Self::InMemory(s) => Some(s),
            Self::Pgmq(_) => None,
        }
    }
}

impl From<PgmqMessagingService> for MessagingProvider {
    fn from(service: PgmqMessagingService) -> Self {
        Self::Pgmq(service)
    }
}

impl From<InMemoryMessagingService> for MessagingProvider {
    fn from(service: InMemoryMessagingService) -> Self {
        Self::InMemory(service)
    }
}
