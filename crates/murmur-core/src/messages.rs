//! Message envelopes and protocol bodies
//!
//! Every message on the substrate is an [`Envelope`] addressed from `src` to
//! `dest`. The body stays a JSON object so handlers decode only the fields
//! they understand; the substrate-level fields (`type`, `msg_id`,
//! `in_reply_to`) are read through the accessors here.

use crate::errors::{ErrorCode, MurmurError, Result};
use crate::identifiers::NodeId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Body field naming the message type
pub const TYPE_FIELD: &str = "type";
/// Body field carrying the sender-local message id
pub const MSG_ID_FIELD: &str = "msg_id";
/// Body field correlating a reply with its request
pub const IN_REPLY_TO_FIELD: &str = "in_reply_to";

/// Message type of the substrate's initialization request
pub const INIT: &str = "init";
/// Reply type for [`INIT`]
pub const INIT_OK: &str = "init_ok";
/// Message type of error replies
pub const ERROR: &str = "error";

/// A routed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender
    pub src: NodeId,
    /// Recipient
    pub dest: NodeId,
    /// Protocol body (always a JSON object)
    pub body: Value,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(src: NodeId, dest: NodeId, body: Value) -> Self {
        Self { src, dest, body }
    }

    /// The body's `type` tag
    pub fn msg_type(&self) -> Option<&str> {
        self.body.get(TYPE_FIELD).and_then(Value::as_str)
    }

    /// The body's `msg_id`, if the sender expects a reply
    pub fn msg_id(&self) -> Option<u64> {
        self.body.get(MSG_ID_FIELD).and_then(Value::as_u64)
    }

    /// The request id this envelope answers, if it is a reply
    pub fn in_reply_to(&self) -> Option<u64> {
        self.body.get(IN_REPLY_TO_FIELD).and_then(Value::as_u64)
    }

    /// Decode the body into a typed request
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.body).map_err(|e| {
            MurmurError::malformed(format!(
                "{} body from {}: {e}",
                self.msg_type().unwrap_or("untyped"),
                self.src
            ))
        })
    }

    /// Parse a single JSON line from the substrate
    pub fn from_json_line(line: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(line)?;
        if !envelope.body.is_object() {
            return Err(MurmurError::malformed("envelope body must be an object"));
        }
        Ok(envelope)
    }

    /// Serialize into a single JSON line (without the trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Return `body` with `msg_id` and `in_reply_to` set where provided.
///
/// Non-object bodies are wrapped as `{"value": body}` first so ids always
/// have somewhere to live.
pub fn with_ids(body: Value, msg_id: Option<u64>, in_reply_to: Option<u64>) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Some(id) = msg_id {
        object.insert(MSG_ID_FIELD.to_string(), json!(id));
    }
    if let Some(id) = in_reply_to {
        object.insert(IN_REPLY_TO_FIELD.to_string(), json!(id));
    }
    Value::Object(object)
}

/// Body with only a `type` tag, used for plain acknowledgments
pub fn ok_body(msg_type: &str) -> Value {
    json!({ TYPE_FIELD: msg_type })
}

/// Body of an `error` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Protocol error code
    pub code: ErrorCode,
    /// Human readable description
    #[serde(default)]
    pub text: String,
}

impl ErrorBody {
    /// Create an error body
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Render as a protocol body
    pub fn to_body(&self) -> Value {
        json!({
            TYPE_FIELD: ERROR,
            "code": self.code,
            "text": self.text,
        })
    }

    /// Interpret a reply body as an error, if it is one
    pub fn from_body(body: &Value) -> Option<Self> {
        if body.get(TYPE_FIELD).and_then(Value::as_str) != Some(ERROR) {
            return None;
        }
        // Unknown codes still surface as an error rather than a success.
        Some(Self::deserialize(body).unwrap_or_else(|_| {
            Self::new(
                ErrorCode::Crash,
                body.get("text").and_then(Value::as_str).unwrap_or_default(),
            )
        }))
    }
}

impl From<&MurmurError> for ErrorBody {
    fn from(err: &MurmurError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Body of the substrate's `init` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Identity assigned to this node
    pub node_id: NodeId,
    /// Every member of the cluster, including this node
    pub node_ids: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accessors_read_substrate_fields() {
        let envelope = Envelope::from_json_line(
            r#"{"src":"c1","dest":"n0","body":{"type":"broadcast","message":3,"msg_id":7}}"#,
        )
        .unwrap();

        assert_eq!(envelope.msg_type(), Some("broadcast"));
        assert_eq!(envelope.msg_id(), Some(7));
        assert_eq!(envelope.in_reply_to(), None);
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        let err = Envelope::from_json_line(r#"{"src":"c1","dest":"n0","body":[1,2]}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
    }

    #[test]
    fn with_ids_preserves_existing_fields() {
        let body = with_ids(json!({"type": "read_ok", "messages": [1]}), Some(4), Some(2));
        assert_eq!(body["type"], "read_ok");
        assert_eq!(body["messages"], json!([1]));
        assert_eq!(body["msg_id"], 4);
        assert_eq!(body["in_reply_to"], 2);
    }

    #[test]
    fn error_body_round_trip() {
        let body = ErrorBody::new(ErrorCode::NotSupported, "no handler for `cas`").to_body();
        assert_eq!(body["code"], 10);

        let parsed = ErrorBody::from_body(&body).unwrap();
        assert_eq!(parsed.code, ErrorCode::NotSupported);
        assert!(ErrorBody::from_body(&ok_body("read_ok")).is_none());
    }

    #[test]
    fn unknown_error_codes_still_read_as_errors() {
        let parsed = ErrorBody::from_body(&json!({"type": "error", "code": 1000, "text": "odd"}))
            .unwrap();
        assert_eq!(parsed.code, ErrorCode::Crash);
        assert_eq!(parsed.text, "odd");
    }

    #[test]
    fn decode_body_reports_malformed() {
        #[derive(Debug, Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            message: i64,
        }

        let envelope = Envelope::new("c1".into(), "n1".into(), json!({"type": "broadcast"}));
        let err = envelope.decode_body::<Needs>().unwrap_err();
        assert!(matches!(err, MurmurError::Malformed { .. }));
    }
}
