//! The JSON envelope exchanged with clients.
//!
//! ```text
//! { "type": "subscribe"|"unsubscribe"|"data"|"error"|"ping"|"pong",
//!   "channel"?: string, "data"?: any, "timestamp"?: epoch millis }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::channel::SYSTEM_CHANNEL;
use crate::errors::ProtocolError;

/// Discriminant of a [`HubMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Client asks to join a channel.
    Subscribe,
    /// Client asks to leave a channel.
    Unsubscribe,
    /// Server pushes a payload.
    Data,
    /// Server reports a recoverable protocol error.
    Error,
    /// Liveness probe (either direction).
    Ping,
    /// Liveness reply.
    Pong,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Data => "data",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Look up a kind by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        [
            Self::Subscribe,
            Self::Unsubscribe,
            Self::Data,
            Self::Error,
            Self::Ping,
            Self::Pong,
        ]
        .into_iter()
        .find(|k| k.as_str() == name)
    }
}

/// A single message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    /// Message kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Channel name. Free-form on input; validated by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Minimal view used to classify a frame before full deserialization.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

impl HubMessage {
    fn new(kind: MessageKind, channel: Option<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            channel,
            data,
            timestamp: Some(now_millis()),
        }
    }

    /// A `data` message carrying `payload` on `channel`.
    pub fn data(channel: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageKind::Data, Some(channel.into()), Some(payload))
    }

    /// A `data` acknowledgement on the `system` pseudo-channel.
    pub fn system(payload: Value) -> Self {
        Self::data(SYSTEM_CHANNEL, payload)
    }

    /// An `error` reply with a human-readable description.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Error,
            None,
            Some(json!({ "message": message.into() })),
        )
    }

    /// A server-initiated liveness probe.
    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, None, None)
    }

    /// A reply to a client `ping`.
    pub fn pong() -> Self {
        Self::new(MessageKind::Pong, None, None)
    }

    /// Parse an inbound text frame.
    ///
    /// Anything that is not a JSON object with a string `type` is
    /// [`ProtocolError::InvalidFormat`]; a string `type` that is not a known
    /// kind is [`ProtocolError::UnknownType`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidFormat)?;
        let envelope =
            Envelope::deserialize(&value).map_err(|_| ProtocolError::InvalidFormat)?;
        if MessageKind::from_wire(&envelope.kind).is_none() {
            return Err(ProtocolError::UnknownType(envelope.kind));
        }
        serde_json::from_value(value).map_err(|_| ProtocolError::InvalidFormat)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_subscribe() {
        let msg = HubMessage::parse(r#"{"type":"subscribe","channel":"market-data"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Subscribe);
        assert_eq!(msg.channel.as_deref(), Some("market-data"));
        assert!(msg.data.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn parse_keeps_client_timestamp_and_data() {
        let msg =
            HubMessage::parse(r#"{"type":"ping","data":{"n":1},"timestamp":1700000000000}"#)
                .unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert_eq!(msg.data.unwrap()["n"], 1);
        assert_eq!(msg.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn parse_garbage_is_invalid_format() {
        assert_eq!(
            HubMessage::parse("not json").unwrap_err(),
            ProtocolError::InvalidFormat
        );
        assert_eq!(HubMessage::parse("").unwrap_err(), ProtocolError::InvalidFormat);
    }

    #[test]
    fn parse_non_object_is_invalid_format() {
        assert_eq!(
            HubMessage::parse("[1,2,3]").unwrap_err(),
            ProtocolError::InvalidFormat
        );
        assert_eq!(
            HubMessage::parse("\"ping\"").unwrap_err(),
            ProtocolError::InvalidFormat
        );
    }

    #[test]
    fn parse_missing_type_is_invalid_format() {
        assert_eq!(
            HubMessage::parse(r#"{"channel":"market-data"}"#).unwrap_err(),
            ProtocolError::InvalidFormat
        );
    }

    #[test]
    fn parse_non_string_type_is_invalid_format() {
        assert_eq!(
            HubMessage::parse(r#"{"type":42}"#).unwrap_err(),
            ProtocolError::InvalidFormat
        );
    }

    #[test]
    fn parse_unknown_type_names_it() {
        assert_eq!(
            HubMessage::parse(r#"{"type":"hello"}"#).unwrap_err(),
            ProtocolError::UnknownType("hello".into())
        );
    }

    #[test]
    fn parse_ill_typed_channel_is_invalid_format() {
        assert_eq!(
            HubMessage::parse(r#"{"type":"subscribe","channel":7}"#).unwrap_err(),
            ProtocolError::InvalidFormat
        );
    }

    #[test]
    fn data_message_shape() {
        let msg = HubMessage::data("market-data", json!({"price": 1}));
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "data");
        assert_eq!(value["channel"], "market-data");
        assert_eq!(value["data"]["price"], 1);
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn error_message_omits_channel() {
        let msg = HubMessage::error("invalid message format");
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["message"], "invalid message format");
        assert!(value.get("channel").is_none());
    }

    #[test]
    fn ping_and_pong_have_only_type_and_timestamp() {
        for msg in [HubMessage::ping(), HubMessage::pong()] {
            let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            let obj = value.as_object().unwrap();
            assert_eq!(obj.len(), 2);
            assert!(obj.contains_key("timestamp"));
        }
    }

    #[test]
    fn system_uses_system_channel() {
        let msg = HubMessage::system(json!({"action": "connected"}));
        assert_eq!(msg.kind, MessageKind::Data);
        assert_eq!(msg.channel.as_deref(), Some(SYSTEM_CHANNEL));
    }

    #[test]
    fn kind_wire_names_roundtrip() {
        for name in ["subscribe", "unsubscribe", "data", "error", "ping", "pong"] {
            assert_eq!(MessageKind::from_wire(name).unwrap().as_str(), name);
        }
        assert!(MessageKind::from_wire("PING").is_none());
    }
}
