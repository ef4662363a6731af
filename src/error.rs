//! # Error Types
//!
//! One error enum per pipeline stage, composed into [`WorkerError`]. Stage
//! errors decide how the coordinator disposes of a message; cleanup failures
//! never surface here and are only logged.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::storage::StorageError;

/// The message payload is not a valid task descriptor
#[derive(Error, Debug)]
#[error("Malformed task descriptor: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// Allocating a staging directory failed
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create staging directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Attempt key '{attempt_key}' cannot be used as a directory name: {reason}")]
    UnsafeAttemptKey { attempt_key: String, reason: String },
}

/// Downloading one input artifact failed
#[derive(Error, Debug)]
#[error("Failed to fetch input artifact {artifact}: {source}")]
pub struct FetchError {
    /// Local name of the artifact, e.g. `block_3.ssz`
    pub artifact: String,
    #[source]
    pub source: StorageError,
}

/// Running the transition command failed before an exit status was obtained
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transition command exceeded its {timeout_seconds}s budget and was killed")]
    TimedOut { timeout_seconds: u64 },

    #[error("Failed to capture transition command output: {source}")]
    Capture {
        #[source]
        source: std::io::Error,
    },
}

/// Emitting the result record failed
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize result record: {message}")]
    Serialization { message: String },

    #[error("Failed to emit result record to {queue}: {source}")]
    Emit {
        queue: String,
        #[source]
        source: MessagingError,
    },

    #[error("Emitting result record to {queue} timed out after {timeout_seconds}s")]
    Timeout { queue: String, timeout_seconds: u64 },
}

/// Top-level error for the worker process
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Startup failed: {message}")]
    Startup { message: String },
}

impl WorkerError {
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
