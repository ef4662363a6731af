//! # Transition Worker Configuration System
//!
//! YAML-based configuration with environment-specific overrides. The loaded
//! [`WorkerConfig`] is immutable after startup and is handed to every component
//! constructor explicitly (wrapped in an `Arc`); nothing reads ambient globals.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transition_worker::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let subscription = config.subscription_queue_name();
//! let concurrency = config.worker.max_concurrent_tasks;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring transition-worker.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker identity and concurrency
    pub worker: WorkerSettings,

    /// Subscription and result queues
    pub messaging: MessagingConfig,

    /// Input and result object storage
    pub storage: StorageConfig,

    /// External transition command
    pub executor: ExecutorConfig,

    /// Per-attempt staging directories
    pub staging: StagingConfig,
}

/// Worker identity, target and concurrency settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Name of this worker, part of the default subscription name
    pub worker_id: String,
    /// Client implementation name; 'zrnt', 'lighthouse', etc.
    pub client_name: String,
    /// Client version and git commit hash start, separated by an underscore
    pub client_version: String,
    /// Spec version this worker accepts tasks for
    pub spec_version: String,
    /// Spec config name this worker accepts tasks for
    pub spec_config: String,
    /// Upper bound on concurrently processed messages
    pub max_concurrent_tasks: usize,
    /// How long shutdown waits for in-flight attempts before abandoning them
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_id: "poc".to_string(),
            client_name: "eth2team".to_string(),
            client_version: "v0.1.2_1a2b3c4".to_string(),
            spec_version: "v0.8.3".to_string(),
            spec_config: "minimal".to_string(),
            max_concurrent_tasks: 4,
            shutdown_grace_seconds: 30,
        }
    }
}

/// Which message queue backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingProviderKind {
    Pgmq,
    InMemory,
}

/// Queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub provider: MessagingProviderKind,
    /// PostgreSQL URL for pgmq; `${VAR}` is expanded from the environment
    pub database_url: Option<String>,
    /// Overrides the derived `<spec version>~<spec config>~<client name>~<worker id>` name
    pub subscription_queue: Option<String>,
    /// Overrides the derived `results~<client name>` name
    pub results_queue: Option<String>,
    /// How long a received message stays invisible to other consumers
    pub visibility_timeout_seconds: u64,
    /// Maximum messages requested per poll
    pub batch_size: usize,
    pub polling_interval_ms: u64,
    /// Per-call bound on result record emission
    pub publish_timeout_seconds: u64,
    /// How long a rejected message stays hidden before redelivery
    pub reject_delay_seconds: u64,
    /// Create missing queues at startup instead of failing
    pub create_queues: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: MessagingProviderKind::Pgmq,
            database_url: None,
            subscription_queue: None,
            results_queue: None,
            visibility_timeout_seconds: 900,
            batch_size: 4,
            polling_interval_ms: 500,
            publish_timeout_seconds: 5,
            reject_delay_seconds: 5,
            create_queues: false,
        }
    }
}

/// Which object storage backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProviderKind {
    Filesystem,
    InMemory,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProviderKind,
    /// Filesystem provider root; each bucket is a directory below it
    pub root: PathBuf,
    /// Bucket holding pre-states and blocks
    pub inputs_bucket: String,
    /// Bucket receiving post-states and logs
    pub results_bucket: String,
    /// Base of the public URLs advertised in result records
    pub public_base_url: String,
    /// Per-call bound on each download and upload
    pub operation_timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProviderKind::Filesystem,
            root: PathBuf::from("storage"),
            inputs_bucket: "muskoka-transitions".to_string(),
            results_bucket: "results-eth2team".to_string(),
            public_base_url: "https://storage.googleapis.com".to_string(),
            operation_timeout_seconds: 10,
        }
    }
}

/// External transition command configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program and leading fixed arguments, split on whitespace
    pub command: String,
    /// Wall-clock budget for one run; 0 disables the limit
    pub timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: "zcli transition blocks".to_string(),
            timeout_seconds: 600,
        }
    }
}

/// Staging directory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Root for per-attempt directories; defaults to `<tmp>/transition-worker`
    pub root: Option<PathBuf>,
    /// Remove the attempt directory once the attempt finishes
    pub cleanup: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: None,
            cleanup: true,
        }
    }
}

impl WorkerConfig {
    /// Queue this worker consumes task descriptors from
    pub fn subscription_queue_name(&self) -> String {
        let raw = self.messaging.subscription_queue.clone().unwrap_or_else(|| {
            format!(
                "{}~{}~{}~{}",
                self.worker.spec_version,
                self.worker.spec_config,
                self.worker.client_name,
                self.worker.worker_id
            )
        });
        normalize_queue_name(&raw)
    }

    /// Queue result records are emitted to
    pub fn results_queue_name(&self) -> String {
        let raw = self
            .messaging
            .results_queue
            .clone()
            .unwrap_or_else(|| format!("results~{}", self.worker.client_name));
        normalize_queue_name(&raw)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging
            .root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("transition-worker"))
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.messaging.visibility_timeout_seconds)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.messaging.polling_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.messaging.publish_timeout_seconds)
    }

    pub fn reject_delay(&self) -> Duration {
        Duration::from_secs(self.messaging.reject_delay_seconds)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.operation_timeout_seconds)
    }

    /// `None` when the executor runs without a wall-clock limit
    pub fn execution_timeout(&self) -> Option<Duration> {
        match self.executor.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.worker.shutdown_grace_seconds)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        let required = [
            ("worker.worker_id", &self.worker.worker_id),
            ("worker.client_name", &self.worker.client_name),
            ("worker.client_version", &self.worker.client_version),
            ("worker.spec_version", &self.worker.spec_version),
            ("worker.spec_config", &self.worker.spec_config),
            ("storage.inputs_bucket", &self.storage.inputs_bucket),
            ("storage.results_bucket", &self.storage.results_bucket),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "transition-worker.yaml",
                ));
            }
        }

        if self.executor.command.split_whitespace().next().is_none() {
            return Err(ConfigurationError::invalid_value(
                "executor.command",
                self.executor.command.clone(),
                "command must name a program",
            ));
        }

        if self.worker.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_concurrent_tasks",
                "0",
                "must be greater than 0",
            ));
        }

        if self.messaging.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.batch_size",
                "0",
                "must be greater than 0",
            ));
        }

        if self.messaging.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.visibility_timeout_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        for (field, seconds) in [
            (
                "messaging.visibility_timeout_seconds",
                self.messaging.visibility_timeout_seconds,
            ),
            ("messaging.reject_delay_seconds", self.messaging.reject_delay_seconds),
        ] {
            if i32::try_from(seconds).is_err() {
                return Err(ConfigurationError::invalid_value(
                    field,
                    seconds.to_string(),
                    "exceeds the queue's supported range",
                ));
            }
        }

        if self.messaging.provider == MessagingProviderKind::Pgmq
            && self
                .messaging
                .database_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigurationError::missing_required_field(
                "messaging.database_url",
                "pgmq messaging provider",
            ));
        }

        for (field, name) in [
            ("messaging.subscription_queue", self.subscription_queue_name()),
            ("messaging.results_queue", self.results_queue_name()),
        ] {
            if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN {
                return Err(ConfigurationError::invalid_value(
                    field,
                    name,
                    format!("queue names must be 1..={MAX_QUEUE_NAME_LEN} characters"),
                ));
            }
        }

        Ok(())
    }
}

/// pgmq prefixes queue tables, which keeps usable names well below the
/// PostgreSQL identifier limit
pub const MAX_QUEUE_NAME_LEN: usize = 47;

/// Map a logical queue name onto the identifier alphabet pgmq accepts
pub fn normalize_queue_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.messaging.provider = MessagingProviderKind::InMemory;
        config
    }

    #[test]
    fn test_default_queue_names_follow_worker_identity() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.subscription_queue_name(),
            "v0_8_3_minimal_eth2team_poc"
        );
        assert_eq!(config.results_queue_name(), "results_eth2team");
    }

    #[test]
    fn test_queue_name_overrides_are_normalized() {
        let mut config = WorkerConfig::default();
        config.messaging.subscription_queue = Some("Custom-Sub.Queue".to_string());
        config.messaging.results_queue = Some("results~Zrnt".to_string());
        assert_eq!(config.subscription_queue_name(), "custom_sub_queue");
        assert_eq!(config.results_queue_name(), "results_zrnt");
    }

    #[test]
    fn test_execution_timeout_zero_disables_limit() {
        let mut config = WorkerConfig::default();
        assert_eq!(config.execution_timeout(), Some(Duration::from_secs(600)));
        config.executor.timeout_seconds = 0;
        assert_eq!(config.execution_timeout(), None);
    }

    #[test]
    fn test_validation_accepts_defaults_with_in_memory_provider() {
        assert!(in_memory_config().validate().is_ok());
    }

    #[test]
    fn test_validation_requires_database_url_for_pgmq() {
        let config = WorkerConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { ref field, .. } if field == "messaging.database_url"
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = in_memory_config();
        config.executor.command = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = in_memory_config();
        config.worker.max_concurrent_tasks = 0;
        assert!(config.validate().is_err());

        let mut config = in_memory_config();
        config.worker.client_name = String::new();
        assert!(config.validate().is_err());

        let mut config = in_memory_config();
        config.messaging.subscription_queue = Some("q".repeat(MAX_QUEUE_NAME_LEN + 1));
        assert!(config.validate().is_err());

        let mut config = in_memory_config();
        config.messaging.reject_delay_seconds = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_derived_queue_names() {
        let mut config = in_memory_config();
        config.worker.worker_id = "w".repeat(MAX_QUEUE_NAME_LEN);
        assert!(config.subscription_queue_name().len() > MAX_QUEUE_NAME_LEN);

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { ref field, .. } if field == "messaging.subscription_queue"
        ));

        let mut config = in_memory_config();
        config.worker.client_name = "c".repeat(MAX_QUEUE_NAME_LEN);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue names must be"));
    }

    #[test]
    fn test_reject_delay_defaults_to_a_short_pause() {
        let mut config = WorkerConfig::default();
        assert_eq!(config.reject_delay(), Duration::from_secs(5));
        config.messaging.reject_delay_seconds = 0;
        assert_eq!(config.reject_delay(), Duration::ZERO);
    }

    #[test]
    fn test_staging_root_defaults_under_temp_dir() {
        let config = WorkerConfig::default();
        assert!(config.staging_root().starts_with(std::env::temp_dir()));

        let mut config = WorkerConfig::default();
        config.staging.root = Some(PathBuf::from("/srv/staging"));
        assert_eq!(config.staging_root(), PathBuf::from("/srv/staging"));
    }
}
