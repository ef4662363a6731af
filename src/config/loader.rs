//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, environment-section merging and `${VAR}` expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::WorkerConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable selecting the configuration environment
pub const ENVIRONMENT_VAR: &str = "TRANSITION_WORKER_ENV";

/// Environment variable pointing at the configuration directory
pub const CONFIG_DIR_VAR: &str = "TRANSITION_WORKER_CONFIG_DIR";

const CONFIG_FILE_NAMES: [&str; 2] = ["transition-worker.yaml", "transition-worker.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded, validated configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: WorkerConfig,
    environment: String,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(&config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;
        let config = Self::parse_with_environment(
            &yaml_content,
            environment,
            &config_file.display().to_string(),
        )?;

        config.validate()?;

        info!(
            environment = %environment,
            config_file = %config_file.display(),
            worker_id = %config.worker.worker_id,
            client_name = %config.worker.client_name,
            spec_version = %config.worker.spec_version,
            spec_config = %config.worker.spec_config,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file,
        }))
    }

    /// Build a manager around an already-constructed configuration
    pub fn from_config(config: WorkerConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: PathBuf::new(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Consume into a shareable configuration value
    pub fn shared_config(&self) -> Arc<WorkerConfig> {
        Arc::new(self.config.clone())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Parse YAML text, apply the environment section and expand variables
    pub fn parse_with_environment(
        yaml_content: &str,
        environment: &str,
        source_name: &str,
    ) -> ConfigResult<WorkerConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: WorkerConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source_name,
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        expand_environment_variables(&mut config)?;
        Ok(config)
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file larger than {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }
}

/// Current environment from environment variables
pub fn detect_environment() -> String {
    env::var(ENVIRONMENT_VAR)
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_config_directory() -> PathBuf {
    env::var(CONFIG_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"))
}

/// Recursively merge YAML values (environment overrides into base config)
fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
    match (&mut *base, override_value) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
            for (key, value) in override_map {
                if let Some(existing_value) = base_map.get_mut(&key) {
                    merge_yaml_values(existing_value, value)?;
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (_, YamlValue::Null) => {}
        (YamlValue::Mapping(_), other) => {
            return Err(ConfigurationError::config_merge_error(format!(
                "cannot merge non-mapping override {other:?} into a section"
            )));
        }
        (base_ref, override_val) => {
            *base_ref = override_val;
        }
    }
    Ok(())
}

/// Expand `${VAR}` placeholders in values that commonly carry secrets
fn expand_environment_variables(config: &mut WorkerConfig) -> ConfigResult<()> {
    if let Some(ref mut url) = config.messaging.database_url {
        if url.starts_with("${") && url.ends_with('}') {
            let var_name = url[2..url.len() - 1].to_string();
            match env::var(&var_name) {
                Ok(env_value) => {
                    debug!("Expanding environment variable {} in database URL", var_name);
                    *url = env_value;
                }
                Err(_) => {
                    warn!("Environment variable {} not found for database URL", var_name);
                    return Err(ConfigurationError::environment_variable_error(
                        var_name,
                        "messaging.database_url",
                    ));
                }
            }
        }
    }
    Ok(())
}
