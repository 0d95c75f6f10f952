use crate::error::ConnectorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// --- Enums ---

/// Lifecycle phase of a [`crate::websocket::WebsocketClient`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    /// Reconnect attempts exhausted. Terminal until `connect()` is called again.
    Abandoned,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Close,
    Message,
    Error,
    Reconnect,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Open,
        EventKind::Close,
        EventKind::Message,
        EventKind::Error,
        EventKind::Reconnect,
    ];
}

// --- Messages ---

/// A message handed to `send`.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Binary(Vec<u8>),
    /// Serialized to a text frame at send time.
    Json(Value),
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        OutboundMessage::Text(text.to_string())
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        OutboundMessage::Text(text)
    }
}

impl From<Vec<u8>> for OutboundMessage {
    fn from(bytes: Vec<u8>) -> Self {
        OutboundMessage::Binary(bytes)
    }
}

/// A JSON string is sent verbatim as text; any other value is serialized.
impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => OutboundMessage::Text(text),
            other => OutboundMessage::Json(other),
        }
    }
}

/// A message delivered to `message` listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A text frame that parsed as JSON.
    Json(Value),
    /// A text frame that is not valid JSON, passed through unchanged.
    Text(String),
    Binary(Vec<u8>),
}

impl InboundMessage {
    /// Decodes a text frame, falling back to the raw text when it is not JSON.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => InboundMessage::Json(value),
            Err(e) => {
                log::debug!("Inbound frame is not JSON ({}), delivering raw text", e);
                InboundMessage::Text(text)
            }
        }
    }
}

// --- Events ---

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
    /// True when the close was requested through `disconnect`/`destroy`.
    pub manual: bool,
}

#[derive(Debug)]
pub enum ClientEvent {
    Open,
    Close(CloseInfo),
    Message(InboundMessage),
    Error(ConnectorError),
    Reconnect { attempt: u32 },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Open => EventKind::Open,
            ClientEvent::Close(_) => EventKind::Close,
            ClientEvent::Message(_) => EventKind::Message,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Reconnect { .. } => EventKind::Reconnect,
        }
    }
}
