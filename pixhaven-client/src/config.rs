//! Configuration loading for the pixhaven client.
//!
//! Read from TOML. Every field is required in the file;
//! [`ClientConfig::default`] exists for embedding the client without one.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PAGE_LIMIT: u32 = 24;
pub const DEFAULT_PREDICTION_CAPACITY: usize = 50;
pub const DEFAULT_STALE_AFTER_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Page size for gallery views.
    pub page_limit: u32,
    /// Most recent uploads kept for optimistic list seeding.
    pub prediction_capacity: usize,
    /// Age after which a cached view is refetched on next load.
    pub stale_after_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            prediction_capacity: DEFAULT_PREDICTION_CAPACITY,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_limit == 0 || self.page_limit > pixhaven_core::MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "page_limit",
                reason: format!("must be in 1..={}", pixhaven_core::MAX_PAGE_LIMIT),
            });
        }
        if self.prediction_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "prediction_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if self.stale_after_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stale_after_ms",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_complete_file() {
        let config = ClientConfig::from_toml(
            "page_limit = 30\nprediction_capacity = 10\nstale_after_ms = 5000\n",
        )
        .unwrap();
        assert_eq!(config.page_limit, 30);
        assert_eq!(config.stale_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_unknown_and_missing_fields() {
        assert!(matches!(
            ClientConfig::from_toml("page_limit = 30\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml(
                "page_limit = 30\nprediction_capacity = 10\nstale_after_ms = 1\ntheme = \"x\"\n"
            ),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = ClientConfig::from_path(Path::new("/nonexistent/pixhaven-client.toml"));
        assert!(matches!(err, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_validate_bounds() {
        let config = ClientConfig {
            page_limit: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "page_limit", .. })
        ));
        assert!(ClientConfig::default().validate().is_ok());
    }
}
