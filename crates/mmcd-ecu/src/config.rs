//! ECU connection and sampling configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! units = "metric"
//!
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud_rate = 1953
//!
//! [sampling]
//! interval_ms = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mmcd_core::UnitSystem;

/// Baud rate the ECU diagnostic line runs at
pub const DEFAULT_BAUD_RATE: u32 = 1953;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete ECU configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcuConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Unit system for display and for the native log header
    #[serde(default)]
    pub units: UnitSystem,
}

impl EcuConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Serial line settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-read deadline
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Query engine speed once after opening the port
    #[serde(default = "default_true")]
    pub probe_on_connect: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            probe_on_connect: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Sampling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Tick interval between poll cycles
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Sleep when no sensors are selected
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Consecutive failed cycles before the loop reports a disconnect
    #[serde(default = "default_watchdog_threshold")]
    pub watchdog_threshold: u32,
}

fn default_interval_ms() -> u64 {
    1
}

fn default_idle_backoff_ms() -> u64 {
    100
}

fn default_watchdog_threshold() -> u32 {
    20
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::live()
    }
}

impl SamplingConfig {
    /// Preset for a real ECU: tick as fast as the bus allows
    pub fn live() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            watchdog_threshold: default_watchdog_threshold(),
        }
    }

    /// Preset for the synthetic source (~20 Hz)
    pub fn synthetic() -> Self {
        Self {
            interval_ms: 50,
            ..Self::live()
        }
    }

    pub fn interval(&self) -> Duration {
        // a zero period would make the ticker panic
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EcuConfig::default();
        assert_eq!(config.connection.baud_rate, 1953);
        assert_eq!(config.connection.read_timeout(), Duration::from_millis(500));
        assert!(config.connection.probe_on_connect);
        assert_eq!(config.sampling.interval_ms, 1);
        assert_eq!(config.sampling.idle_backoff_ms, 100);
        assert_eq!(config.sampling.watchdog_threshold, 20);
        assert_eq!(config.units, UnitSystem::Metric);
    }

    #[test]
    fn test_synthetic_preset() {
        let sampling = SamplingConfig::synthetic();
        assert_eq!(sampling.interval(), Duration::from_millis(50));
        assert_eq!(sampling.watchdog_threshold, 20);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let sampling = SamplingConfig {
            interval_ms: 0,
            ..SamplingConfig::live()
        };
        assert_eq!(sampling.interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = EcuConfig::from_toml_str(
            r#"
            units = "english"

            [connection]
            port = "/dev/ttyUSB1"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.port, "/dev/ttyUSB1");
        assert_eq!(config.connection.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.units, UnitSystem::English);
        assert_eq!(config.sampling.watchdog_threshold, 20);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sampling]\ninterval_ms = 25\nwatchdog_threshold = 5").unwrap();

        let config = EcuConfig::load(file.path()).unwrap();
        assert_eq!(config.sampling.interval_ms, 25);
        assert_eq!(config.sampling.watchdog_threshold, 5);
    }

    #[test]
    fn test_invalid_toml() {
        let err = EcuConfig::from_toml_str("[connection\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
