//! Protocol error types

use thiserror::Error;

/// Errors from parsing or encoding relay protocol types
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Destination address string did not parse
    #[error("invalid destination '{address}': {reason}")]
    InvalidDestination {
        /// The offending address string
        address: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Batch failed to encode
    #[error("failed to encode batch: {0}")]
    Encode(#[source] bincode::Error),

    /// Batch failed to decode
    #[error("failed to decode batch: {0}")]
    Decode(#[source] bincode::Error),

    /// Framed payload exceeds the maximum message size
    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Allowed maximum
        max: usize,
    },
}
