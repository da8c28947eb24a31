//! Protocol-layer errors: serialization and message-level violations.

/// Errors from encoding, decoding, or protocol-rule checks.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes were malformed, truncated, or of the wrong shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Parsed fine but violates a protocol rule (bad version, wrong
    /// first message, and so on).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
