#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, pgmq in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Transition Worker
//!
//! Queue-driven worker that runs state transitions with an external client
//! tool and publishes what it produced.
//!
//! ## Overview
//!
//! Each task descriptor names a pre-state and a number of blocks stored under
//! `{spec-version}/{spec-config}/{key}/` in the inputs bucket. For every
//! delivery the worker:
//!
//! 1. allocates a fresh staging directory keyed by task key and attempt key
//! 2. downloads `pre.ssz` and `block_0.ssz` .. `block_{n-1}.ssz`
//! 3. runs the transition command (`zcli transition blocks` by default)
//! 4. hashes `post.ssz` with SHA-256
//! 5. uploads the post-state and both logs to the results bucket
//! 6. emits a result record to the results queue
//!
//! and then acknowledges the message. Anything that prevents a record from
//! being emitted rejects the message for redelivery instead.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment sections
//! - [`messaging`] - Queue abstraction with pgmq and in-memory providers
//! - [`storage`] - Object store abstraction with filesystem and in-memory backends
//! - [`worker`] - Staging, inputs, execution, fingerprinting, publishing and the pool
//! - [`bootstrap`] - Startup wiring
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use transition_worker::bootstrap::WorkerBootstrap;
//! use transition_worker::config::ConfigManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let handle = WorkerBootstrap::bootstrap(manager.shared_config()).await?;
//!
//! // ... until a shutdown signal arrives
//! let summary = handle.stop(manager.config().shutdown_grace()).await;
//! println!("acknowledged {} messages", summary.acknowledged);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod storage;
pub mod worker;

pub use bootstrap::{WorkerBootstrap, WorkerSystemHandle};
pub use config::{ConfigManager, WorkerConfig};
pub use error::{Result, WorkerError};
pub use messaging::{MessagingProvider, ResultRecord, TransitionMessage};
pub use storage::ObjectStore;
pub use worker::{AttemptReport, Disposition, TaskCoordinator, WorkerHandle, WorkerPool};
