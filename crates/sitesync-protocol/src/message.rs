//! Message types carried on the real-time channel.
//!
//! Every frame is a JSON object with a string discriminator under `type`
//! (older servers send `kind`; both are accepted on decode, `type` is always
//! written on encode). The discriminator picks how the remaining fields are
//! read:
//!
//! ```text
//! { "type": "change", "collection": "jobsites", "document_id": "js-7",
//!   "operation": "update", "document": { ... } }
//! ```
//!
//! Kinds this crate does not know are kept as [`Message::Unknown`] with
//! every field intact, so a newer server never breaks an older client.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// Field that carries the discriminator on the wire.
pub const TYPE_FIELD: &str = "type";

/// Alternate discriminator field accepted when decoding.
pub const KIND_FIELD: &str = "kind";

const CHANGE_KIND: &str = "change";
const ERROR_KIND: &str = "error";

// ---------------------------------------------------------------------------
// RawMessage: the untyped decode boundary
// ---------------------------------------------------------------------------

/// A message reduced to its discriminator plus an open map of fields.
///
/// This is the shape every frame is first parsed into. Known kinds are then
/// validated into their typed variant; everything else stays raw.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawMessage {
    /// The discriminator (`type` on the wire).
    pub kind: String,
    /// Every other field of the frame, in document order.
    pub fields: Map<String, Value>,
}

impl RawMessage {
    /// Creates a message of the given kind with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field, replacing any previous value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Serialize for RawMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(TYPE_FIELD, &self.kind)?;
        for (name, value) in &self.fields {
            if name != TYPE_FIELD {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let tag = fields
            .remove(TYPE_FIELD)
            .or_else(|| fields.remove(KIND_FIELD));
        match tag {
            Some(Value::String(kind)) => Ok(Self { kind, fields }),
            Some(other) => Err(de::Error::custom(format!(
                "message discriminator must be a string, got {other}"
            ))),
            None => Err(de::Error::missing_field(TYPE_FIELD)),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

/// What happened to a document in the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
}

/// A change notification pushed by the server when a stored document
/// (a project, a jobsite, ...) was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Collection the document lives in, e.g. `"jobsites"`.
    pub collection: String,
    /// Identifier of the changed document.
    pub document_id: String,
    /// The kind of write.
    pub operation: ChangeOperation,
    /// The document after the write. Absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
}

/// A failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// HTTP-style status code (400, 404, 500, ...).
    pub code: u16,
    /// Human-readable description.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A discriminated unit of communication.
///
/// Decoding goes through [`RawMessage`] first, so a frame without a string
/// discriminator is rejected before any variant is considered, and a known
/// kind with malformed fields is rejected instead of silently becoming
/// [`Message::Unknown`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMessage")]
pub enum Message {
    /// `type = "change"`: a stored document changed.
    Change(DocumentChange),
    /// `type = "error"`: the server reports a failure.
    Error(ServerError),
    /// Any other kind, kept verbatim.
    Unknown(RawMessage),
}

impl Message {
    /// The wire discriminator of this message.
    pub fn kind(&self) -> &str {
        match self {
            Self::Change(_) => CHANGE_KIND,
            Self::Error(_) => ERROR_KIND,
            Self::Unknown(raw) => &raw.kind,
        }
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = ProtocolError;

    fn try_from(raw: RawMessage) -> Result<Self, ProtocolError> {
        match raw.kind.as_str() {
            CHANGE_KIND => serde_json::from_value(Value::Object(raw.fields))
                .map(Message::Change)
                .map_err(ProtocolError::Decode),
            ERROR_KIND => serde_json::from_value(Value::Object(raw.fields))
                .map(Message::Error)
                .map_err(ProtocolError::Decode),
            "" => Err(ProtocolError::InvalidMessage(
                "message discriminator is empty".into(),
            )),
            _ => Ok(Message::Unknown(raw)),
        }
    }
}

/// A known payload with the discriminator spliced in front of its fields.
#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Change(change) => Tagged {
                kind: CHANGE_KIND,
                body: change,
            }
            .serialize(serializer),
            Self::Error(error) => Tagged {
                kind: ERROR_KIND,
                body: error,
            }
            .serialize(serializer),
            Self::Unknown(raw) => raw.serialize(serializer),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(text: &str) -> Result<Message, serde_json::Error> {
        serde_json::from_str(text)
    }

    #[test]
    fn test_change_decodes_into_typed_variant() {
        let msg = decode(
            r#"{"type":"change","collection":"jobsites","document_id":"js-7",
                "operation":"update","document":{"lat":40.1,"lng":-3.7}}"#,
        )
        .unwrap();

        let Message::Change(change) = msg else {
            panic!("expected change, got {msg:?}");
        };
        assert_eq!(change.collection, "jobsites");
        assert_eq!(change.document_id, "js-7");
        assert_eq!(change.operation, ChangeOperation::Update);
        assert_eq!(change.document.unwrap()["lat"], 40.1);
    }

    #[test]
    fn test_kind_field_is_accepted_as_discriminator() {
        let msg = decode(r#"{"kind":"error","code":404,"message":"no such site"}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::Error(ServerError {
                code: 404,
                message: "no such site".into(),
            })
        );
    }

    #[test]
    fn test_unknown_kind_keeps_all_fields() {
        let msg = decode(r#"{"type":"presence","user":"ana","online":true}"#).unwrap();
        assert_eq!(msg.kind(), "presence");

        let Message::Unknown(raw) = msg else {
            panic!("expected unknown variant");
        };
        assert_eq!(raw.get("user"), Some(&json!("ana")));
        assert_eq!(raw.get("online"), Some(&json!(true)));
        assert!(raw.get("type").is_none());
    }

    #[test]
    fn test_missing_discriminator_is_rejected() {
        let err = decode(r#"{"collection":"projects"}"#).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_non_string_discriminator_is_rejected() {
        assert!(decode(r#"{"type":7}"#).is_err());
    }

    #[test]
    fn test_empty_discriminator_is_rejected() {
        assert!(decode(r#"{"type":""}"#).is_err());
    }

    #[test]
    fn test_known_kind_with_bad_fields_is_rejected() {
        // `operation` must be one of the four write kinds.
        let result = decode(
            r#"{"type":"change","collection":"c","document_id":"d","operation":"upsert"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_non_object_frame_is_rejected() {
        assert!(decode("[1,2,3]").is_err());
        assert!(decode("\"change\"").is_err());
    }

    #[test]
    fn test_delete_omits_document_on_encode() {
        let msg = Message::Change(DocumentChange {
            collection: "projects".into(),
            document_id: "p-2".into(),
            operation: ChangeOperation::Delete,
            document: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "change",
                "collection": "projects",
                "document_id": "p-2",
                "operation": "delete",
            })
        );
    }

    #[test]
    fn test_raw_message_encodes_type_even_if_fields_shadow_it() {
        let mut raw = RawMessage::new("note").with("text", "pour concrete");
        raw.fields.insert("type".into(), json!("spoofed"));

        let value = serde_json::to_value(Message::Unknown(raw)).unwrap();
        assert_eq!(value["type"], "note");
        assert_eq!(value["text"], "pour concrete");
    }

    #[test]
    fn test_unknown_message_survives_encode_and_decode() {
        let original = Message::Unknown(
            RawMessage::new("marker_moved")
                .with("site", "js-3")
                .with("lat", 51.5),
        );
        let text = serde_json::to_string(&original).unwrap();
        assert_eq!(decode(&text).unwrap(), original);
    }
}
