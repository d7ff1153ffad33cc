//! Configuration file handling for mmcd

use anyhow::{Context, Result};
use mmcd_core::UnitSystem;
use mmcd_ecu::EcuConfig;
use std::path::{Path, PathBuf};

/// Load the ECU configuration from the default config file, if there is one
pub fn load() -> Result<EcuConfig> {
    let config_path = config_path()?;
    if config_path.exists() {
        load_from(&config_path)
    } else {
        Ok(EcuConfig::default())
    }
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<EcuConfig> {
    EcuConfig::load(path).with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// Get the default config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("mmcd");

    Ok(config_dir.join("config.toml"))
}

/// Command-line overrides for file settings
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub units: Option<UnitSystem>,
}

/// Merge CLI arguments over config file values
pub fn merge_with_args(mut config: EcuConfig, overrides: &Overrides) -> EcuConfig {
    if let Some(port) = &overrides.port {
        config.connection.port = port.clone();
    }
    if let Some(baud_rate) = overrides.baud_rate {
        config.connection.baud_rate = baud_rate;
    }
    if let Some(units) = overrides.units {
        config.units = units;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_override_file() {
        let file = EcuConfig::from_toml_str(
            r#"
            units = "english"

            [connection]
            port = "/dev/ttyS0"
            baud_rate = 1953
            "#,
        )
        .unwrap();

        let merged = merge_with_args(
            file,
            &Overrides {
                port: Some("/dev/ttyUSB1".into()),
                ..Default::default()
            },
        );
        assert_eq!(merged.connection.port, "/dev/ttyUSB1");
        assert_eq!(merged.connection.baud_rate, 1953);
        assert_eq!(merged.units, UnitSystem::English);
    }

    #[test]
    fn test_no_overrides_keeps_file() {
        let mut file = EcuConfig::default();
        file.connection.port = "COM3".into();
        let merged = merge_with_args(file, &Overrides::default());
        assert_eq!(merged.connection.port, "COM3");
        assert_eq!(merged.units, UnitSystem::Metric);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sampling]\nwatchdog_threshold = 5\n").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.sampling.watchdog_threshold, 5);
        assert_eq!(config.connection.baud_rate, 1953);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
