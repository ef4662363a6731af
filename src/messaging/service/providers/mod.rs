//! Messaging provider implementations

mod in_memory;
mod pgmq;

pub use self::in_memory::InMemoryMessagingService;
pub use self::pgmq::PgmqMessagingService;
