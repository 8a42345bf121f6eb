//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/daq_sync.toml` (base configuration)
//! 2. Environment variables prefixed with `DAQ_SYNC_`, nested keys separated
//!    by `__`
//!
//! Every section has defaults, so a missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use daq_sync::config::SyncConfig;
//!
//! // DAQ_SYNC_ACTION__NAP=50ms overrides [action] nap
//! let config = SyncConfig::load()?;
//! println!("Polling every {:?}", config.action.nap);
//! # Ok::<(), daq_sync::config::ConfigError>(())
//! ```

use daq_action::ActionSettings;
use daq_generator::GeneratorSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_sync.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAQ_SYNC_";

/// Failure to load or validate the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values loaded but failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Action loop timing
    #[serde(default)]
    pub action: ActionSettings,
    /// Software trigger/gate generation
    #[serde(default)]
    pub generator: GeneratorSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

// Default value functions
fn default_name() -> String {
    "daq-sync".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and environment variables.
    ///
    /// The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider chain used by [`SyncConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(SyncConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        self.action
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.generator
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
