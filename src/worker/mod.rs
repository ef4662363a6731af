//! # Transition Worker Pipeline
//!
//! Components that take one delivered task descriptor from staging to a
//! published result record, plus the pool that runs them concurrently.
//!
//! - [`staging`]: per-attempt scratch directories
//! - [`inputs`]: download of the pre-state and blocks
//! - [`executor`]: external transition command
//! - [`fingerprint`]: SHA-256 of the post-state
//! - [`publisher`]: result uploads and the result record
//! - [`coordinator`]: per-message lifecycle and disposition
//! - [`pool`]: bounded concurrency and graceful drain

pub mod attempt;
pub mod coordinator;
pub mod executor;
pub mod fingerprint;
pub mod inputs;
pub mod pool;
pub mod publisher;
pub mod staging;

pub use attempt::{new_attempt_key, Attempt, AttemptReport, AttemptState, Disposition};
pub use coordinator::TaskCoordinator;
pub use executor::{CommandTemplate, ExecutionOutcome, Executor};
pub use inputs::InputMaterializer;
pub use pool::{PoolStats, PoolStatsSnapshot, WorkerHandle, WorkerPool};
pub use publisher::{ResultLocations, ResultPublisher};
pub use staging::StagingManager;
