//! # Messaging Service Abstraction Layer
//!
//! Provider-agnostic messaging with enum dispatch.
//!
//! ```text
//! MessagingProvider (enum)
//!   ├── Pgmq(PgmqMessagingService)
//!   └── InMemory(InMemoryMessagingService)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let provider = MessagingProvider::Pgmq(PgmqMessagingService::new(&url).await?);
//!
//! let messages = provider
//!     .receive_messages::<serde_json::Value>(&queue, 4, Duration::from_secs(900))
//!     .await?;
//! provider.ack_message(&queue, &messages[0].receipt_handle).await?;
//! ```

mod provider;
pub mod providers;
mod traits;
mod types;

pub use provider::MessagingProvider;
pub use providers::{InMemoryMessagingService, PgmqMessagingService};
pub use traits::{MessagingService, QueueMessage};
pub use types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle, Redelivery,
};

pub use super::errors::{MessagingError, MessagingResult};
