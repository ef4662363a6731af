//! # Messaging Module
//!
//! Queue transport for task descriptors and result records.
//!
//! - [`service`]: provider-agnostic queue operations (pgmq, in-memory)
//! - [`message`]: the JSON documents carried on the queues
//! - [`errors`]: `MessagingError` and `MessagingResult`

pub mod errors;
pub mod message;
pub mod service;

pub use errors::{MessagingError, MessagingResult};
pub use message::{ResultFiles, ResultRecord, ResultUploads, TransitionMessage};
pub use service::{
    InMemoryMessagingService, MessagingProvider, MessagingService, PgmqMessagingService,
    QueuedMessage, ReceiptHandle, Redelivery,
};
