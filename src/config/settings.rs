//! Application settings

use crate::core::driver::DriverOptions;
use crate::core::protocol::ProtocolSelector;
use crate::core::reading::MassUnit;
use crate::core::target::DEFAULT_TOLERANCE_KG;
use crate::core::transport::ConnectionSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or unknown
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Protocol selector, `auto` or a registry name or alias
    pub protocol: String,
    /// Default connection
    pub connection: ConnectionConfig,
    /// Target watch defaults
    pub target: TargetConfig,
    /// Reading display
    pub display: DisplayConfig,
    /// Driver timing
    pub polling: PollingConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            protocol: "auto".to_string(),
            connection: ConnectionConfig::default(),
            target: TargetConfig::default(),
            display: DisplayConfig::default(),
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from the platform config directory, defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to an explicit file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value that can be checked without a device
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol_selector()?;
        self.connection
            .line
            .validate()
            .map_err(|e| ConfigError::InvalidValue(format!("connection: {e}")))?;
        if !(self.target.tolerance_kg.is_finite() && self.target.tolerance_kg > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "target.tolerance_kg must be positive, got {}",
                self.target.tolerance_kg
            )));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "polling.interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parsed protocol selector
    pub fn protocol_selector(&self) -> Result<ProtocolSelector, ConfigError> {
        self.protocol
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("protocol: {e}")))
    }

    /// Driver options from the polling section
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            poll_interval: Duration::from_millis(self.polling.interval_ms),
            idle_sleep: Duration::from_millis(self.polling.idle_sleep_ms),
            ..DriverOptions::default()
        }
    }
}

/// Default connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port name used when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Line settings
    pub line: ConnectionSettings,
}

/// Target watch defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Tolerance in kilograms
    pub tolerance_kg: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            tolerance_kg: DEFAULT_TOLERANCE_KG,
        }
    }
}

/// Reading display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Unit readings are shown in
    pub unit: MassUnit,
    /// Decimal places
    pub decimals: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            unit: MassUnit::Kg,
            decimals: 3,
        }
    }
}

/// Driver timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between poll commands for request/response protocols
    pub interval_ms: u64,
    /// Sleep after an empty read
    pub idle_sleep_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            idle_sleep_ms: 10,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `weighlink_core=debug`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::ProtocolId;
    use crate::core::transport::Parity;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.protocol_selector().unwrap(), ProtocolSelector::Auto);
        assert_eq!(config.connection.line.baud_rate, 9600);
        assert_eq!(config.target.tolerance_kg, 0.001);
        assert_eq!(config.display.unit, MassUnit::Kg);
        assert_eq!(config.display.decimals, 3);
        assert_eq!(config.driver_options().poll_interval, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.protocol = "TOKVES".to_string();
        config.connection.port = Some("/dev/ttyUSB0".to_string());
        config.connection.line = ConnectionSettings::new(4800).parity(Parity::Even);
        config.display.unit = MassUnit::G;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.protocol_selector().unwrap(),
            ProtocolSelector::Explicit(ProtocolId::TokvesSh50)
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "protocol = \"Ohaus\"\n\n[connection.line]\nbaud_rate = 2400\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.connection.line.baud_rate, 2400);
        assert_eq!(config.connection.line.data_bits, 8);
        assert_eq!(config.polling, PollingConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "protocol = \"acme-9000\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::InvalidValue(_))
        ));

        std::fs::write(&path, "[target]\ntolerance_kg = 0.0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::InvalidValue(_))
        ));

        std::fs::write(&path, "protocol = [").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));

        assert!(matches!(
            AppConfig::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
