//! Configuration for a migration deployment

use crate::dualwriter::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Migration progress
    pub migration: MigrationConfig,
    /// Backing store settings
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Active migration mode (0-4)
    pub mode: Mode,
    /// Per-request timeout in milliseconds; unset means no deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Request channel capacity of the legacy store
    pub legacy_buffer: usize,
    /// Request channel capacity of the unified store
    pub unified_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            migration: MigrationConfig {
                mode: Mode::Mode0,
                request_timeout_ms: None,
            },
            storage: StorageConfig {
                legacy_buffer: 32,
                unified_buffer: 32,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.legacy_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "legacy_buffer must be greater than 0".to_string(),
            ));
        }

        if self.storage.unified_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "unified_buffer must be greater than 0".to_string(),
            ));
        }

        if self.migration.request_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "request_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.migration.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.storage.unified_buffer = 0;
        assert!(config.validate().is_err());

        config.storage.unified_buffer = 8;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_parsed_from_integer() {
        let config = Config::from_toml_str(
            r#"
            [migration]
            mode = 3
            request_timeout_ms = 250

            [storage]
            legacy_buffer = 16
            unified_buffer = 16

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.migration.mode, Mode::Mode3);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_out_of_range_mode_rejected() {
        let result = Config::from_toml_str(
            r#"
            [migration]
            mode = 7

            [storage]
            legacy_buffer = 16
            unified_buffer = 16

            [logging]
            level = "info"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.migration.mode = Mode::Mode2;
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();
        let loaded = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.migration.mode, Mode::Mode2);
    }
}
