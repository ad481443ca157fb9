//! # Message Envelope
//!
//! The unit exchanged on both channels.
//!
//! ```text
//! {"event": "<name>", "data": <any JSON value>}
//! ```
//!
//! Both fields are mandatory on decode. Unknown fields are ignored so newer
//! peers can add metadata without breaking older ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// An `{event, data}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing key used to pick a handler on the receiving side.
    pub event: String,
    /// Opaque payload handed to the handler.
    pub data: Value,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to the wire form (compact JSON).
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Encoding` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encoding(e.to_string()))
    }

    /// Parse the wire form.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::MalformedEnvelope` if the bytes are not JSON or
    /// either `event` or `data` is missing.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }
}

/// Parse a reply. Replies are arbitrary JSON, not necessarily envelopes.
///
/// # Errors
///
/// Returns `ProtocolError::MalformedReply` if the bytes are not JSON.
pub fn decode_reply(bytes: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedReply(e.to_string()))
}

/// Serialize a reply value.
///
/// # Errors
///
/// Returns `ProtocolError::Encoding` if serialization fails.
pub fn encode_reply(reply: &Value) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(reply).map_err(|e| ProtocolError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_produces_event_and_data() {
        let envelope = Envelope::new("ping", json!({"n": 1}));
        let bytes = envelope.encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["event"], "ping");
        assert_eq!(value["data"], json!({"n": 1}));
    }

    #[test]
    fn test_decode_missing_event_fails() {
        let result = Envelope::decode(br#"{"data": {"n": 1}}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_missing_data_fails() {
        let result = Envelope::decode(br#"{"event": "ping"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_accepts_null_data() {
        let envelope = Envelope::decode(br#"{"event": "ping", "data": null}"#).unwrap();
        assert_eq!(envelope.event, "ping");
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let envelope = Envelope::decode(br#"{"event": "a", "data": 3, "extra": true}"#).unwrap();
        assert_eq!(envelope, Envelope::new("a", json!(3)));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Envelope::decode(b"\x00\x01not json").is_err());
        assert!(decode_reply(b"{").is_err());
    }
}
