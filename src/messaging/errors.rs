//! # Messaging Error Types
//!
//! Structured error handling for the messaging system using thiserror
//! instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Messaging error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Database query error: {operation}: {message}")]
    DatabaseQuery { operation: String, message: String },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Failed to create queue {queue_name}: {message}")]
    QueueCreation { queue_name: String, message: String },

    #[error("Failed to send to queue {queue_name}: {message}")]
    Send { queue_name: String, message: String },

    #[error("Failed to receive from queue {queue_name}: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Failed to ack message {message_id} on {queue_name}: {message}")]
    Ack {
        queue_name: String,
        message_id: String,
        message: String,
    },

    #[error("Failed to nack message {message_id} on {queue_name}: {message}")]
    Nack {
        queue_name: String,
        message_id: String,
        message: String,
    },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Network timeout: operation {operation} timed out after {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Health check failed: {message}")]
    HealthCheck { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn database_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_creation(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueCreation {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn send(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Send {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Receive {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn ack(
        queue_name: impl Into<String>,
        message_id: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Ack {
            queue_name: queue_name.into(),
            message_id: message_id.to_string(),
            message: message.into(),
        }
    }

    pub fn nack(
        queue_name: impl Into<String>,
        message_id: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Nack {
            queue_name: queue_name.into(),
            message_id: message_id.to_string(),
            message: message.into(),
        }
    }

    pub fn message_not_found(message_id: impl ToString) -> Self {
        Self::MessageNotFound {
            message_id: message_id.to_string(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Conversion from sqlx::Error to MessagingError
impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => MessagingError::database_query("query", "No rows found"),
            sqlx::Error::Database(db_err) => {
                MessagingError::database_query("database", db_err.to_string())
            }
            sqlx::Error::PoolTimedOut => MessagingError::timeout("database_pool", 30),
            sqlx::Error::Configuration(config_err) => {
                MessagingError::configuration("database", config_err.to_string())
            }
            _ => MessagingError::connection(err.to_string()),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from pgmq::errors::PgmqError to MessagingError
impl From<pgmq::errors::PgmqError> for MessagingError {
    fn from(err: pgmq::errors::PgmqError) -> Self {
        MessagingError::internal(format!("pgmq: {err}"))
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let conn_err = MessagingError::connection("Connection failed");
        assert!(matches!(conn_err, MessagingError::Connection { .. }));

        let send_err = MessagingError::send("results_zrnt", "closed");
        assert!(matches!(send_err, MessagingError::Send { .. }));

        let timeout_err = MessagingError::timeout("publish", 5);
        assert!(matches!(timeout_err, MessagingError::Timeout { .. }));
    }

    #[test]
    fn test_error_conversions() {
        let sqlx_err = sqlx::Error::PoolTimedOut;
        let messaging_err: MessagingError = sqlx_err.into();
        assert!(matches!(messaging_err, MessagingError::Timeout { .. }));

        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageDeserialization { .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let ack_err = MessagingError::ack("my_queue", 42_i64, "gone");
        let display_str = format!("{ack_err}");
        assert!(display_str.contains("my_queue"));
        assert!(display_str.contains("42"));
        assert!(display_str.contains("gone"));
    }
}
