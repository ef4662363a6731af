//! # Messaging Service Types
//!
//! Values that cross the [`MessagingService`](super::MessagingService) seam.
//! Both transports key messages by a numeric id (pgmq's `msg_id`, the
//! in-memory queue's sequence number), so ids and receipt handles are typed
//! integers rather than opaque strings.
//!
//! A received transition task travels as `QueuedMessage<serde_json::Value>`:
//! the pool only needs the handle to settle it, and the coordinator decodes
//! the payload itself so that a malformed body is a rejection, not a receive
//! error.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Id the transport assigned when a message was enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(i64);

impl MessageId {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticket for settling one delivery (ack or nack)
///
/// Valid until the message is acknowledged, archived, or its visibility
/// timeout lapses and another consumer receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(MessageId);

impl ReceiptHandle {
    pub fn message_id(self) -> MessageId {
        self.0
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(MessageId(id))
    }
}

impl From<MessageId> for ReceiptHandle {
    fn from(id: MessageId) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What happens to a negatively acknowledged message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    /// Hidden for the given delay, then offered to consumers again.
    /// `Duration::ZERO` makes it visible immediately.
    After(Duration),
    /// Moved out of the live queue; never delivered again
    Archive,
}

/// A delivery: the payload plus what the transport knows about it
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub receipt_handle: ReceiptHandle,
    pub message: T,
    /// 1 on first delivery; grows each time the visibility timeout lapses or
    /// the message is requeued
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl<T> QueuedMessage<T> {
    pub fn new(
        receipt_handle: ReceiptHandle,
        message: T,
        receive_count: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            receipt_handle,
            message,
            receive_count,
            enqueued_at,
        }
    }
}

/// Depth of one queue, logged when the worker starts
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub queue_name: String,
    /// Every live message, visible or not
    pub message_count: u64,
    /// Received but not yet settled; `None` when the transport cannot tell
    pub in_flight_count: Option<u64>,
    pub oldest_message_age: Option<Duration>,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            in_flight_count: None,
            oldest_message_age: None,
        }
    }

    pub fn with_in_flight_count(mut self, count: u64) -> Self {
        self.in_flight_count = Some(count);
        self
    }

    pub fn with_oldest_message_age(mut self, age: Duration) -> Self {
        self.oldest_message_age = Some(age);
        self
    }
}

/// Outcome of checking that the subscription and results queues exist.
/// Startup aborts unless [`is_healthy`](Self::is_healthy).
#[derive(Debug, Clone, Default)]
pub struct QueueHealthReport {
    pub healthy: Vec<String>,
    pub missing: Vec<String>,
    /// `(queue, error)` for queues whose existence could not be determined
    pub errors: Vec<(String, String)>,
}

impl QueueHealthReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty()
    }

    pub fn add_healthy(&mut self, queue_name: impl Into<String>) {
        self.healthy.push(queue_name.into());
    }

    pub fn add_missing(&mut self, queue_name: impl Into<String>) {
        self.missing.push(queue_name.into());
    }

    pub fn add_error(&mut self, queue_name: impl Into<String>, error: impl Into<String>) {
        self.errors.push((queue_name.into(), error.into()));
    }
}

impl fmt::Display for QueueHealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing: {:?}", self.missing)?;
        for (queue, error) in &self.errors {
            write!(f, "; {queue}: {error}")?;
        }
        Ok(())
    }
}
