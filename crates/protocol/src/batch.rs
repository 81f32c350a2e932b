//! Batch codec and wire framing
//!
//! The relay ships ordered batches of `QueueEntry` records to downstream
//! destinations. The payload encoding is pluggable via `BatchCodec`; the
//! default is bincode. Framing is a 4-byte big-endian length prefix, shared
//! with the intake side.

use bytes::{BufMut, BytesMut};

use crate::{ProtocolError, QueueEntry, Result};

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum framed payload size (16MB)
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Pluggable payload codec for outbound batches
///
/// Compatibility requires only that both ends of a connection agree on one
/// implementation. Implementations must preserve record order.
pub trait BatchCodec: Send + Sync {
    /// Encode an ordered batch of records into one payload
    fn encode(&self, records: &[QueueEntry]) -> Result<Vec<u8>>;

    /// Decode a payload back into its ordered records
    fn decode(&self, payload: &[u8]) -> Result<Vec<QueueEntry>>;
}

/// Default codec: bincode-serialized record vector
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BatchCodec for BincodeCodec {
    fn encode(&self, records: &[QueueEntry]) -> Result<Vec<u8>> {
        bincode::serialize(records).map_err(ProtocolError::Encode)
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<QueueEntry>> {
        bincode::deserialize(payload).map_err(ProtocolError::Decode)
    }
}

/// Frame a payload with its 4-byte big-endian length prefix
///
/// # Errors
///
/// Returns `ProtocolError::PayloadTooLarge` if the payload exceeds 16MB.
pub fn frame(payload: &[u8]) -> Result<BytesMut> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf)
}
