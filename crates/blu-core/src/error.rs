//! Configuration errors

use thiserror::Error;

/// Errors raised while assembling an [`AppConfig`](crate::AppConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingValue(&'static str),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
