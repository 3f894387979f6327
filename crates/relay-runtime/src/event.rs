//! Inbound frame decoding.
//!
//! Frames are JSON envelopes `{"event": "<kind>", "payload": <payload>}`.
//! For notifications the payload is a JSON document encoded as a string,
//! so it takes a second decode; an already-structured object is accepted
//! as well.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event kind that is forwarded to the push gateway.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Why a frame or its payload could not be used.
#[derive(Debug, Error)]
pub enum EventError {
    /// The frame is not a JSON envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope has no payload.
    #[error("missing payload")]
    MissingPayload,

    /// The encoded payload is not valid JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// The payload carries no usable `id`.
    #[error("payload has no notification id")]
    MissingId,
}

/// A decoded envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct StreamEvent {
    /// Event kind (`notification`, `update`, `delete`, ...).
    #[serde(rename = "event")]
    pub kind: String,
    /// Raw payload, decoded lazily.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl StreamEvent {
    /// Whether this event is forwarded.
    pub fn is_notification(&self) -> bool {
        self.kind == NOTIFICATION_EVENT
    }

    /// Decode the payload, unwrapping a string-encoded document.
    pub fn decoded_payload(&self) -> Result<Value, EventError> {
        match &self.payload {
            None | Some(Value::Null) => Err(EventError::MissingPayload),
            Some(Value::String(encoded)) => {
                serde_json::from_str(encoded).map_err(EventError::MalformedPayload)
            }
            Some(other) => Ok(other.clone()),
        }
    }

    /// The notification id carried in the payload.
    pub fn notification_id(&self) -> Result<NotificationId, EventError> {
        let payload = self.decoded_payload()?;
        match payload.get("id") {
            Some(id @ (Value::String(_) | Value::Number(_))) => Ok(NotificationId(id.clone())),
            _ => Err(EventError::MissingId),
        }
    }
}

/// Decode one text frame into an envelope.
pub fn decode_frame(text: &str) -> Result<StreamEvent, EventError> {
    serde_json::from_str(text).map_err(EventError::Malformed)
}

/// Opaque notification identifier, passed to the gateway verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Value);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
