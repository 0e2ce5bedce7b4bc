//! Application configuration.
//!
//! Aggregates the per-component sections into a single [`Config`] loaded from
//! YAML files and environment variables.

mod engine;
mod messaging;

pub use engine::{
    BatchConfig, NotifierConfig, PipelineConfig, ReconcileConfig, DEFAULT_BATCH_SIZE,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_SWEEP_INTERVAL_MS,
};
pub use messaging::{KafkaConfig, MessagingConfig, TransportKind};

use serde::Deserialize;

use crate::storage::Collections;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TOPOLOGY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TOPOLOGY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TOPOLOGY_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatcher and worker pool.
    pub pipeline: PipelineConfig,
    /// Completion notifier polling.
    pub notifier: NotifierConfig,
    /// Batch processor for high-volume record types.
    pub batch: BatchConfig,
    /// Source-to-derived graph reconciliation.
    pub reconcile: ReconcileConfig,
    /// Graph store collection names.
    pub collections: Collections,
    /// Inbound transport and outbound notifications.
    pub messaging: MessagingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without consulting files or the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.batch_size == 0 {
            return Err(ConfigError::Invalid("batch.batch_size must be > 0".to_string()));
        }
        if self.batch.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "batch.flush_interval_ms must be > 0".to_string(),
            ));
        }
        if self.pipeline.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.sweep_interval_ms must be > 0".to_string(),
            ));
        }
        if self.notifier.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "notifier.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.reconcile.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
