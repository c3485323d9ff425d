//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later sources overriding earlier ones:
//!
//! 1. `<dir>/engine.toml`
//! 2. `<dir>/engine.<environment>.toml`
//! 3. `TRANSITION_ENGINE_*` environment variables
//!
//! Every source is optional; missing ones fall back to [`EngineConfig::default`].

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use crate::constants::{CONFIG_FILE_STEM, DEFAULT_CONFIG_DIRECTORY, ENV_PREFIX};
use crate::logging::get_environment;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded, validated engine configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIRECTORY));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        debug!(
            strict_mode = config.strict_mode,
            state_channel_capacity = config.state_channel_capacity,
            default_policy = ?config.default_policy,
            "✅ Engine configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn load_and_merge_config(directory: &Path, environment: &str) -> ConfigResult<EngineConfig> {
        let base = directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overrides = directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let merged = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overrides).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        merged
            .try_deserialize::<EngineConfig>()
            .map_err(ConfigurationError::deserialize_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Environment the configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the configuration files were read from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Merged configuration as JSON, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }
}
