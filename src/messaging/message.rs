//! # Queue Message Types
//!
//! Wire formats for the subscription queue (inbound task descriptors) and the
//! results queue (outbound result records). Field names use the hyphenated
//! keys other transition workers already exchange.

use serde::{Deserialize, Serialize};

/// Inbound task descriptor
///
/// ```json
/// {"blocks": 2, "spec-version": "v0.8.3", "spec-config": "minimal", "key": "abc"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMessage {
    /// Number of blocks to apply to the pre-state
    pub blocks: u32,
    #[serde(rename = "spec-version")]
    pub spec_version: String,
    #[serde(rename = "spec-config")]
    pub spec_config: String,
    /// Identifies the task; inputs live under `{spec-version}/{spec-config}/{key}/`
    pub key: String,
}

impl TransitionMessage {
    /// Decode a descriptor from a raw queue payload
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Whether this worker is configured for the descriptor's spec target
    pub fn targets(&self, spec_version: &str, spec_config: &str) -> bool {
        self.spec_version == spec_version && self.spec_config == spec_config
    }
}

/// Outbound result record, emitted once per completed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Whether the transition tool exited successfully
    pub success: bool,
    /// `0x`-prefixed SHA-256 of the post-state, `null` if none was produced
    #[serde(rename = "post-hash")]
    pub post_hash: Option<String>,
    #[serde(rename = "client-name")]
    pub client_name: String,
    #[serde(rename = "client-version")]
    pub client_version: String,
    /// Task key copied from the descriptor
    pub key: String,
    /// Public URLs the artifacts were written to
    pub files: ResultFiles,
    /// Which of `files` were actually uploaded
    pub uploaded: ResultUploads,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFiles {
    #[serde(rename = "post-state")]
    pub post_state: String,
    #[serde(rename = "out-log")]
    pub out_log: String,
    #[serde(rename = "err-log")]
    pub err_log: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultUploads {
    #[serde(rename = "post-state")]
    pub post_state: bool,
    #[serde(rename = "out-log")]
    pub out_log: bool,
    #[serde(rename = "err-log")]
    pub err_log: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_task_descriptor() {
        let msg = TransitionMessage::from_json(json!({
            "blocks": 3,
            "spec-version": "v0.8.3",
            "spec-config": "minimal",
            "key": "a1b2"
        }))
        .unwrap();

        assert_eq!(msg.blocks, 3);
        assert_eq!(msg.key, "a1b2");
        assert!(msg.targets("v0.8.3", "minimal"));
        assert!(!msg.targets("v0.8.3", "mainnet"));
    }

    #[test]
    fn test_decode_rejects_malformed_descriptors() {
        let missing_key = json!({"blocks": 1, "spec-version": "v", "spec-config": "c"});
        assert!(TransitionMessage::from_json(missing_key).is_err());

        let negative = json!({"blocks": -1, "spec-version": "v", "spec-config": "c", "key": "k"});
        assert!(TransitionMessage::from_json(negative).is_err());

        let wrong_type = json!({"blocks": "two", "spec-version": "v", "spec-config": "c", "key": "k"});
        assert!(TransitionMessage::from_json(wrong_type).is_err());

        assert!(TransitionMessage::from_json(json!("just a string")).is_err());
    }

    #[test]
    fn test_result_record_wire_format() {
        let record = ResultRecord {
            success: true,
            post_hash: None,
            client_name: "zrnt".to_string(),
            client_version: "v0.9.0_abcdef0".to_string(),
            key: "k".to_string(),
            files: ResultFiles {
                post_state: "https://host/b/post.ssz".to_string(),
                out_log: "https://host/b/std_out_log.txt".to_string(),
                err_log: "https://host/b/std_err_log.txt".to_string(),
            },
            uploaded: ResultUploads {
                post_state: false,
                out_log: true,
                err_log: true,
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["post-hash"], serde_json::Value::Null);
        assert_eq!(value["client-name"], "zrnt");
        assert_eq!(value["client-version"], "v0.9.0_abcdef0");
        assert_eq!(value["files"]["out-log"], "https://host/b/std_out_log.txt");
        assert_eq!(value["files"]["err-log"], "https://host/b/std_err_log.txt");
        assert_eq!(value["uploaded"]["post-state"], false);
    }
}
