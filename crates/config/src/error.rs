//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A destination address string did not parse
    #[error("invalid destination address: {0}")]
    InvalidDestination(#[from] metro_protocol::ProtocolError),

    /// Two configured destinations share the same (host, instance) identity
    #[error("duplicate destination '{key}' - (host, instance) pairs must be unique")]
    DuplicateDestination {
        /// The conflicting routing key
        key: String,
    },

    /// Validation error - invalid value
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },
}
