//! Routing error types

use std::io;
use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors from router mutation or relay-rules loading
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A destination with this (host, instance) identity is already registered
    #[error("destination '{key}' is already registered")]
    DuplicateDestination {
        /// The conflicting routing key
        key: String,
    },

    /// The destination was never registered (or already removed)
    #[error("destination '{key}' is not registered")]
    UnknownDestination {
        /// The missing routing key
        key: String,
    },

    /// Failed to read the relay-rules file
    #[error("failed to read rules file '{path}': {source}")]
    RuleFileIo {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A rule line did not parse
    #[error("invalid rule file line {line}: {message}")]
    InvalidRuleLine {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// A rule's regex pattern did not compile
    #[error("invalid pattern in rule '{rule}': {source}")]
    InvalidPattern {
        /// Rule section name
        rule: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// A rule section has no destinations
    #[error("rule '{rule}' has no destinations")]
    MissingDestinations {
        /// Rule section name
        rule: String,
    },

    /// A rule destination address did not parse
    #[error("rule '{rule}' has an invalid destination: {source}")]
    InvalidRuleDestination {
        /// Rule section name
        rule: String,
        /// Underlying parse error
        #[source]
        source: metro_protocol::ProtocolError,
    },

    /// The rules file must contain exactly one default rule
    #[error("rules file '{path}' must contain exactly one default rule, found {found}")]
    DefaultRuleCount {
        /// Path to the file
        path: String,
        /// How many default rules were found
        found: usize,
    },
}
