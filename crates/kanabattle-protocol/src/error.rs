//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes and the Rust types disagreed:
//! malformed JSON, an unknown `type` tag, a missing field.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type`, missing required
    /// fields, or a number that doesn't fit (e.g. a negative duration).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
