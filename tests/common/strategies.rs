use proptest::prelude::*;

/// Task keys and attempt keys as they appear in practice
pub fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9_-]{0,23}"
}

pub fn attempt_key_pair_strategy() -> impl Strategy<Value = (String, String)> {
    ("[0-9a-f]{32}", "[0-9a-f]{32}").prop_filter("attempt keys must differ", |(a, b)| a != b)
}

pub fn blocks_strategy() -> impl Strategy<Value = u32> {
    0u32..64
}
