//! Delivery error types

use std::io;

use thiserror::Error;

/// Result type for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors from delivery channels and the manager
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Could not establish a connection to the destination
    #[error("connection failed to {target}: {source}")]
    ConnectionFailed {
        /// The destination address
        target: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A batch write failed mid-connection
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// A batch write exceeded the write timeout
    #[error("write timed out")]
    WriteTimeout,

    /// No live connection to send on
    #[error("no connection to destination")]
    NoConnection,

    /// Batch encoding or framing failed
    #[error(transparent)]
    Protocol(#[from] metro_protocol::ProtocolError),

    /// A destination with this routing key is already managed
    #[error("destination '{key}' is already started")]
    DuplicateDestination {
        /// The `(host, instance)` routing key
        key: String,
    },

    /// No managed destination with this routing key
    #[error("destination '{key}' is not started")]
    UnknownDestination {
        /// The `(host, instance)` routing key
        key: String,
    },

    /// Destination registration was rejected by the router
    #[error(transparent)]
    Routing(#[from] metro_routing::RoutingError),
}
