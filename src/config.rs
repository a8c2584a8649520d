//! Configuration using Figment
//!
//! Configuration is layered from:
//! 1. built-in defaults
//! 2. `config/default.toml` (or the file given on the command line)
//! 3. environment variables prefixed with `INSTRUMENT_CONTROL_`, using `__`
//!    between nested keys
//!
//! # Example
//! ```no_run
//! use instrument_control::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Port: {}", config.connection.port);
//! # Ok::<(), instrument_control::error::InstrumentError>(())
//! ```
//!
//! `INSTRUMENT_CONTROL_CONNECTION__TIMEOUT_MS=5000` overrides
//! `connection.timeout_ms`.

use crate::devices::DeviceModel;
use crate::discovery::{DEFAULT_MAX_CONCURRENCY, DEFAULT_PROBE_TIMEOUT};
use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "INSTRUMENT_CONTROL_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument connection defaults
    pub connection: ConnectionConfig,
    /// Network scan settings
    pub discovery: DiscoveryConfig,
    /// Devices listed by `supported_devices`
    pub supported_devices: Vec<DeviceDescription>,
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
}

/// Connection defaults for new devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Instrument TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect and read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Network scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Time one host gets to answer in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Hosts probed in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Name and description of a supported device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    /// Device name
    pub name: String,
    /// Free text description
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct SupportedDevicesFile {
    #[serde(default)]
    supported_devices: Vec<DeviceDescription>,
}

// Default value functions
fn default_name() -> String {
    "Instrument Control".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_supported_devices() -> Vec<DeviceDescription> {
    DeviceModel::ALL
        .iter()
        .map(|model| DeviceDescription {
            name: model.id().to_string(),
            description: model.display_name().to_string(),
        })
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            connection: ConnectionConfig::default(),
            discovery: DiscoveryConfig::default(),
            supported_devices: default_supported_devices(),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl ConnectionConfig {
    /// Timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DiscoveryConfig {
    /// Probe timeout as a duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> InstrumentResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment. A missing file leaves
    /// the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> InstrumentResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate().map_err(InstrumentError::Configuration)?;
        tracing::debug!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(config)
    }

    /// Provider stack used by [`AppConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.connection.port == 0 {
            return Err("Invalid port 0".to_string());
        }

        if self.connection.timeout_ms == 0 {
            return Err("connection.timeout_ms must be greater than 0".to_string());
        }

        if self.discovery.probe_timeout_ms == 0 {
            return Err("discovery.probe_timeout_ms must be greater than 0".to_string());
        }

        if self.discovery.max_concurrency == 0 {
            return Err("discovery.max_concurrency must be greater than 0".to_string());
        }

        let mut names = std::collections::HashSet::new();
        for device in &self.supported_devices {
            if device.name.trim().is_empty() {
                return Err("Supported device with empty name".to_string());
            }
            if !names.insert(&device.name) {
                return Err(format!("Duplicate supported device: {}", device.name));
            }
        }

        Ok(())
    }
}

/// Read only the `[[supported_devices]]` list from `path`.
pub fn parse_supported_devices(path: impl AsRef<Path>) -> InstrumentResult<Vec<DeviceDescription>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(InstrumentError::Configuration(format!(
            "config file '{}' not found",
            path.display()
        )));
    }
    let file: SupportedDevicesFile = Figment::from(Toml::file(path)).extract()?;
    Ok(file.supported_devices)
}
