//! Per-message attempt bookkeeping: attempt identity, lifecycle states and
//! the report the coordinator hands back to the pool.

use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use crate::messaging::{ResultRecord, TransitionMessage};

/// A fresh attempt key; never reused, even for redeliveries of one message
pub fn new_attempt_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One execution of one task descriptor
#[derive(Debug, Clone)]
pub struct Attempt {
    pub task: TransitionMessage,
    pub attempt_key: String,
    pub staging_path: PathBuf,
}

/// Lifecycle states of a message inside the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Received,
    Decoded,
    Staged,
    Executed,
    Fingerprinted,
    Published,
    Acknowledged,
    Rejected,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Rejected)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Staged => "staged",
            Self::Executed => "executed",
            Self::Fingerprinted => "fingerprinted",
            Self::Published => "published",
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// What the transport should do with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message; it will not be delivered again
    Ack,
    /// Hand the message back for redelivery
    Reject,
}

/// Result of processing one delivery
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// Task key, once the descriptor decoded
    pub key: Option<String>,
    /// Attempt key, once a staging directory was requested
    pub attempt_key: Option<String>,
    /// Last state reached; always terminal
    pub state: AttemptState,
    pub disposition: Disposition,
    /// The emitted result record, if one was emitted
    pub record: Option<ResultRecord>,
}

impl AttemptReport {
    pub(crate) fn rejected(key: Option<String>, attempt_key: Option<String>) -> Self {
        Self {
            key,
            attempt_key,
            state: AttemptState::Rejected,
            disposition: Disposition::Reject,
            record: None,
        }
    }

    pub(crate) fn acknowledged(
        key: Option<String>,
        attempt_key: Option<String>,
        record: Option<ResultRecord>,
    ) -> Self {
        Self {
            key,
            attempt_key,
            state: AttemptState::Acknowledged,
            disposition: Disposition::Ack,
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_attempt_keys_are_unique_hex() {
        let keys: HashSet<String> = (0..1000).map(|_| new_attempt_key()).collect();
        assert_eq!(keys.len(), 1000);
        for key in &keys {
            assert_eq!(key.len(), 32);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(AttemptState::Acknowledged.is_terminal());
        assert!(AttemptState::Rejected.is_terminal());
        assert!(!AttemptState::Published.is_terminal());
        assert_eq!(AttemptState::Fingerprinted.to_string(), "fingerprinted");
    }

    #[test]
    fn test_report_constructors_pair_state_and_disposition() {
        let rejected = AttemptReport::rejected(Some("k".into()), None);
        assert_eq!(rejected.state, AttemptState::Rejected);
        assert_eq!(rejected.disposition, Disposition::Reject);

        let acked = AttemptReport::acknowledged(Some("k".into()), Some("a".into()), None);
        assert_eq!(acked.state, AttemptState::Acknowledged);
        assert_eq!(acked.disposition, Disposition::Ack);
    }
}
