//! Bridge Settings
//!
//! Loaded with the `config` crate: an optional TOML file, then environment
//! variables prefixed `TELEMATICS__` with `__` between nested keys
//! (e.g. `TELEMATICS__COORDINATOR__WORKAROUND_MODE=true`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use refresh_coordinator::{ConfigError, CoordinatorConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::rate_limit::RateLimitConfig;

/// File looked up when no path is given; any supported extension works
pub const DEFAULT_CONFIG_FILE: &str = "telematics-bridge";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid coordinator settings: {0}")]
    Coordinator(#[from] ConfigError),

    #[error("vin must be set")]
    MissingVin,

    #[error("invalid command rate limit (per_second={per_second}, burst_size={burst_size})")]
    RateLimit { per_second: u64, burst_size: u32 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub vin: String,
    pub coordinator: CoordinatorConfig,
    pub commands: RateLimitConfig,
    /// Accept `PUT /api/v1/mode`. Off unless set explicitly.
    pub allow_runtime_mode_switch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            vin: String::new(),
            coordinator: CoordinatorConfig::default(),
            commands: RateLimitConfig::default(),
            allow_runtime_mode_switch: false,
        }
    }
}

impl Settings {
    /// Load from `path` (required when given) or the default file if it
    /// exists, overlaid with the environment
    pub fn load(path: Option<&str>) -> Result<Self, SettingsError> {
        let file = File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(path.is_some());
        let env = Environment::with_prefix("TELEMATICS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("coordinator.diagnostic_items");

        Self::from_builder(Config::builder().add_source(file).add_source(env))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.vin.trim().is_empty() {
            return Err(SettingsError::MissingVin);
        }
        if self.commands.per_second == 0 || self.commands.burst_size == 0 {
            return Err(SettingsError::RateLimit {
                per_second: self.commands.per_second,
                burst_size: self.commands.burst_size,
            });
        }
        self.coordinator.validate()?;
        Ok(())
    }
}
