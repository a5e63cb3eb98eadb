//! Encoded unit carried across the thread boundary

use bytes::Bytes;

/// One encoded packet.
///
/// The payload is reference counted, so moving a unit through the queue
/// never copies the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Encoded bytes
    pub payload: Bytes,
    /// Position in the producer's output sequence
    pub sequence: u64,
    /// Presentation timestamp in microseconds
    pub timestamp_us: u64,
    /// Duration covered by the payload in microseconds
    pub duration_us: u64,
}

impl EncodedUnit {
    pub fn new(payload: Bytes, sequence: u64, timestamp_us: u64, duration_us: u64) -> Self {
        Self {
            payload,
            sequence,
            timestamp_us,
            duration_us,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
