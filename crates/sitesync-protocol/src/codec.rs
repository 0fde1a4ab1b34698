//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust values and the text carried by a frame.
//! The client only needs something that implements [`Codec`]; today that is
//! [`JsonCodec`], which matches the self-describing documents the server
//! speaks.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that encodes values to text frames and decodes them back.
///
/// `Send + Sync + 'static` because the codec lives inside the client's
/// driver task for the whole life of the client.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into the payload of a text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes the payload of a text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the text is malformed or does not
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ## Example
///
/// ```rust
/// use sitesync_protocol::{Codec, JsonCodec, Message, RawMessage};
///
/// let codec = JsonCodec;
/// let msg = Message::Unknown(RawMessage::new("presence").with("user", "ana"));
///
/// let text = codec.encode(&msg).unwrap();
/// let decoded: Message = codec.decode(&text).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeOperation, DocumentChange, Message};

    #[test]
    fn test_encode_produces_type_discriminator() {
        let msg = Message::Change(DocumentChange {
            collection: "projects".into(),
            document_id: "p-1".into(),
            operation: ChangeOperation::Delete,
            document: None,
        });
        let text = JsonCodec.encode(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "change");
        assert_eq!(value["operation"], "delete");
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result: Result<Message, _> = JsonCodec.decode("{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_error_message_mentions_decode() {
        let err = JsonCodec.decode::<Message>("[]").unwrap_err();
        assert!(err.to_string().starts_with("decode failed"));
    }
}
