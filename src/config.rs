//! Configuration System using Figment
//!
//! Strongly-typed configuration for the acquisition daemon. Layers, lowest
//! precedence first:
//! 1. Built-in defaults
//! 2. `config/sds011.toml` (or the file passed with `--config`)
//! 3. Environment variables prefixed with `SDS011_`, sections separated by `__`
//! 4. Command-line flags
//!
//! # Example
//! ```no_run
//! use sds011_daq::config::{ConfigOverrides, Sds011Config};
//!
//! // SDS011_SENSOR__PORT_PATH=/dev/ttyUSB1 overrides the file
//! let config = Sds011Config::load(None, &ConfigOverrides::default())?;
//! println!("Port: {}", config.sensor.port_path);
//! # Ok::<(), sds011_daq::error::DaqError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, DaqError};

/// Config file consulted when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "config/sds011.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sds011Config {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial sensor settings
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Acquisition loop settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Serial sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default = "default_port_path")]
    pub port_path: String,
    /// Line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Upper bound on a single frame read, in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

/// Acquisition loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Seconds between queries in passive mode (1-255)
    #[serde(default = "default_interval")]
    pub interval_secs: u8,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_port_path() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    crate::hardware::sds011::BAUD_RATE
}

fn default_read_timeout() -> u64 {
    3000
}

fn default_interval() -> u8 {
    10
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port_path: default_port_path(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl SensorConfig {
    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Values supplied on the command line; `None` leaves lower layers in effect
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--port-path`
    pub port_path: Option<String>,
    /// `--interval`
    pub interval_secs: Option<u8>,
    /// `--log-level`
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, mut figment: Figment) -> Figment {
        if let Some(port_path) = &self.port_path {
            figment = figment.merge(Serialized::default("sensor.port_path", port_path));
        }
        if let Some(interval) = self.interval_secs {
            figment = figment.merge(Serialized::default("acquisition.interval_secs", interval));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("application.log_level", level));
        }
        figment
    }
}

impl Sds011Config {
    /// Load and validate configuration
    ///
    /// `path` names an explicit config file, which must exist. Without it the
    /// default file is used when present.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> AppResult<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(DaqError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            Some(path) => path,
            None => Path::new(DEFAULT_CONFIG_PATH),
        };

        let config: Self = overrides.apply(Self::figment(file)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, file and environment layers (without CLI overrides)
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("SDS011_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if !VALID_LOG_FORMATS.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        if self.sensor.port_path.trim().is_empty() {
            return Err(DaqError::Configuration("port_path must not be empty".into()));
        }

        if self.sensor.baud_rate == 0 {
            return Err(DaqError::Configuration("baud_rate must be positive".into()));
        }

        if self.sensor.read_timeout_ms == 0 {
            return Err(DaqError::Configuration(
                "read_timeout_ms must be positive".into(),
            ));
        }

        if self.acquisition.interval_secs == 0 {
            return Err(DaqError::Configuration(
                "Invalid interval_secs 0. Must be 1-255".into(),
            ));
        }

        Ok(())
    }
}
