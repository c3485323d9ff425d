//! # System Constants
//!
//! Defaults and environment variable names that define the operational
//! boundaries of the transition engine.

/// Default capacity of the published state broadcast channel
pub const DEFAULT_STATE_CHANNEL_CAPACITY: usize = 1024;

/// Prefix for environment variable configuration overrides
pub const ENV_PREFIX: &str = "TRANSITION_ENGINE";

/// Base name of the layered configuration files (`engine.toml`, `engine.<env>.toml`)
pub const CONFIG_FILE_STEM: &str = "engine";

/// Default configuration directory, relative to the working directory
pub const DEFAULT_CONFIG_DIRECTORY: &str = "config";

/// Environment detection and logging variables
pub mod env {
    pub const ENVIRONMENT: &str = "TRANSITION_ENGINE_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "TRANSITION_ENGINE_LOG_FORMAT";
    pub const DEFAULT_ENVIRONMENT: &str = "development";
}

/// Operation names used in structured engine logs
pub mod operations {
    pub const REGISTER: &str = "register";
    pub const SUBMIT: &str = "submit";
    pub const SHUTDOWN: &str = "shutdown";
}
