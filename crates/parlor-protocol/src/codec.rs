//! Codec seam between typed messages and transport bytes.
//!
//! The protocol layer never assumes a serialization format; anything that
//! implements [`Codec`] works. [`JsonCodec`] is the in-tree default.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `DeserializeOwned` so decoded values never borrow the receive buffer.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// JSON codec via `serde_json`, the in-tree default. Game data rides as
/// [`serde_json::Value`] inside snapshots, so JSON is always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, Payload, SystemMessage};

    #[test]
    fn test_json_codec_round_trips_envelope() {
        let codec = JsonCodec;
        let envelope = Envelope {
            seq: 7,
            timestamp: 123,
            payload: Payload::System(SystemMessage::Heartbeat {
                client_time: 123,
            }),
        };

        let bytes = codec.encode(&envelope).unwrap();
        let decoded: Envelope = codec.decode(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_json_codec_decode_rejects_garbage() {
        let codec = JsonCodec;
        let result: Result<Envelope, _> = codec.decode(b"\x00\x01\x02");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
