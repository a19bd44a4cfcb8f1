//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sandbox mode is not one of the supported values
    #[error("Invalid sandbox mode: {0}")]
    InvalidSandbox(String),

    /// Boolean value could not be parsed
    #[error("Invalid boolean value: {0}")]
    InvalidBoolean(String),

    /// Log level is not one of the supported values
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
