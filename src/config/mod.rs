//! # Engine Configuration System
//!
//! Explicit, validated configuration for a [`StateEngine`](crate::StateEngine).
//! Every engine instance receives its own configuration at construction time;
//! there is no process-wide default observer or policy.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transition_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Layered load: engine.toml, engine.<env>.toml, TRANSITION_ENGINE_* variables
//! let manager = ConfigManager::load()?;
//!
//! let strict = manager.config().strict_mode;
//! let capacity = manager.config().state_channel_capacity;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::DEFAULT_STATE_CHANNEL_CAPACITY;
use crate::execution::concurrency::ConcurrencyMode;
use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Per-engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enforce handler-exists checks on `submit`. Defaults to on in debug
    /// builds and off in release builds.
    pub strict_mode: bool,

    /// Buffer size of the published state broadcast. Subscribers that fall
    /// further behind than this skip the oldest states.
    pub state_channel_capacity: usize,

    /// Policy applied to registrations that do not name their own
    pub default_policy: ConcurrencyMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mode: cfg!(debug_assertions),
            state_channel_capacity: DEFAULT_STATE_CHANNEL_CAPACITY,
            default_policy: ConcurrencyMode::Merge,
        }
    }
}

impl EngineConfig {
    /// Configuration with handler-exists checks enabled regardless of build profile
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Self::default()
        }
    }

    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.state_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "state_channel_capacity",
                "0",
                "state broadcast capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let config = EngineConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.state_channel_capacity, DEFAULT_STATE_CHANNEL_CAPACITY);
        assert_eq!(config.default_policy, ConcurrencyMode::Merge);
        assert_eq!(config.strict_mode, cfg!(debug_assertions));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EngineConfig {
            state_channel_capacity: 0,
            ..EngineConfig::strict()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { ref field, .. } if field == "state_channel_capacity"));
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"default_policy": "sequential"}"#).unwrap();

        assert_eq!(config.default_policy, ConcurrencyMode::Sequential);
        assert_eq!(config.state_channel_capacity, DEFAULT_STATE_CHANNEL_CAPACITY);
    }
}
