//! Error types for the protocol layer.
//!
//! Each sitesync crate defines its own error enum. A `ProtocolError` always
//! means a frame could not be turned into a [`Message`](crate::Message) (or
//! back), never that the network misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into text).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning text into a Rust value).
    ///
    /// Common causes: the frame is not JSON, the discriminator is missing,
    /// or a known message kind carries fields of the wrong shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
