//! Metro Protocol - Core types for the Metro relay
//!
//! This crate provides the foundational types that flow through the relay:
//! - `Datapoint` - One (timestamp, value) sample
//! - `MetricName` - Opaque, dot-delimited metric identifier
//! - `Destination` - One downstream target (host, port, optional instance)
//! - `QueueEntry` - A (metric, datapoint) pair queued for delivery
//! - `BatchCodec` - Pluggable payload codec with a bincode default
//!
//! # Wire Format
//!
//! Outbound batches are framed with a 4-byte big-endian length prefix:
//! ```text
//! [4 bytes: length (big-endian)][N bytes: codec-encoded record batch]
//! ```
//!
//! The payload encoding is opaque to the relay core - both ends only need to
//! agree on one `BatchCodec` implementation.

mod batch;
mod error;
mod types;

pub use batch::{frame, BatchCodec, BincodeCodec, LENGTH_PREFIX_SIZE};
pub use error::ProtocolError;
pub use types::{Datapoint, Destination, MetricName, QueueEntry};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod types_test;
