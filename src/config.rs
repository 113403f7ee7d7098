//! Configuration using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `LOCKIN_`, nested keys split on `__`
//! 2. A TOML file (default: `config/lockin.toml`)
//! 3. Built-in defaults
//!
//! ```toml
//! [device]
//! address = "GPIB::12::INSTR"
//! reference = "internal"
//!
//! [link]
//! timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ```text
//! LOCKIN_DEVICE__ADDRESS="GPIB0::7::INSTR"
//! LOCKIN_LINK__TIMEOUT_MS=500
//! LOCKIN_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::binding::DeviceProperties;
use crate::error::{AppResult, DaqError};

/// Default configuration file location.
pub const DEFAULT_PATH: &str = "config/lockin.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LOCKIN_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockinConfig {
    /// `[device]`
    #[serde(default)]
    pub device: DeviceProperties,
    /// `[link]`
    #[serde(default)]
    pub link: LinkConfig,
    /// `[logging]`
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Instrument link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Bound on a single register access, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl LinkConfig {
    /// `timeout_ms` as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LockinConfig {
    /// Load from [`DEFAULT_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_PATH)
    }

    /// Load from `path` (which need not exist) and the environment, then validate.
    ///
    /// # Errors
    ///
    /// `Config` if a source cannot be parsed, `ConfigValidation` if the merged
    /// values are unusable.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> AppResult<()> {
        if self.device.address.trim().is_empty() {
            return Err(DaqError::ConfigValidation(
                "device.address cannot be empty".to_string(),
            ));
        }
        if self.link.timeout_ms == 0 {
            return Err(DaqError::ConfigValidation(
                "link.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(DaqError::ConfigValidation(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}
