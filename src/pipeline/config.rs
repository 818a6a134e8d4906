//! Execution configuration for the pipeline executor.

use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A configuration value is out of range or failed to parse.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Default capacity of the bounded hand-off channels between stages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Configuration for the pipeline executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of each bounded hand-off channel between adjacent stages.
    ///
    /// Small capacities trade latency for memory: a stage that outruns its
    /// downstream neighbor blocks on a full channel instead of buffering
    /// without bound. This is also the bound on how far a stage can run
    /// ahead of a cancellation request.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hand-off channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ETL_CHANNEL_CAPACITY`: hand-off channel capacity (default: 4)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ETL_CHANNEL_CAPACITY") {
            config.channel_capacity = parse_env_value(&val, "ETL_CHANNEL_CAPACITY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the channel capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "channel_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Parses an environment variable value, mapping parse failures to
/// `ConfigError::InvalidValue`.
fn parse_env_value<T>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new().with_channel_capacity(16);
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig::new().with_channel_capacity(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value::<usize>("8", "KEY"), Ok(8));
        assert!(parse_env_value::<usize>("not-a-number", "KEY").is_err());
    }
}
