//! Input Materializer
//!
//! Pulls the pre-state and every block of a task from the inputs bucket into
//! the attempt's staging directory, one artifact at a time and in order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;
use crate::messaging::TransitionMessage;
use crate::storage::{with_timeout, ObjectStore};

/// Local (and remote) name of the pre-state artifact
pub const PRE_STATE_FILE: &str = "pre.ssz";

/// Local name of block `index`
pub fn block_file_name(index: u32) -> String {
    format!("block_{index}.ssz")
}

/// `pre.ssz`, then `block_0.ssz` .. `block_{blocks-1}.ssz`
pub fn artifact_names(blocks: u32) -> Vec<String> {
    std::iter::once(PRE_STATE_FILE.to_string())
        .chain((0..blocks).map(block_file_name))
        .collect()
}

/// Object name of an input artifact: `{spec-version}/{spec-config}/{key}/{name}`
pub fn input_object_name(task: &TransitionMessage, name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        task.spec_version, task.spec_config, task.key, name
    )
}

#[derive(Debug, Clone)]
pub struct InputMaterializer {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    timeout: Duration,
}

impl InputMaterializer {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            timeout,
        }
    }

    /// Download all input artifacts into `staging_path`
    ///
    /// Stops at the first failure; artifacts already written stay in place for
    /// the caller's cleanup to remove. Returns the names fetched.
    pub async fn materialize(
        &self,
        staging_path: &Path,
        task: &TransitionMessage,
    ) -> Result<Vec<String>, FetchError> {
        let names = artifact_names(task.blocks);

        for name in &names {
            let object = input_object_name(task, name);
            let dest = staging_path.join(name);

            let bytes = with_timeout(
                "download",
                self.timeout,
                self.store.download_to(&self.bucket, &object, &dest),
            )
            .await
            .map_err(|source| FetchError {
                artifact: name.clone(),
                source,
            })?;

            debug!(
                key = %task.key,
                bucket = %self.bucket,
                object = %object,
                bytes = bytes,
                "Fetched input artifact"
            );
        }

        Ok(names)
    }
}
