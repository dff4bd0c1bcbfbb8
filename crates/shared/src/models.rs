//! Wire envelopes and HTTP bodies.
//!
//! The relay itself never parses relayed traffic. Only [`SystemMessage`] is
//! produced by the server; the signaling envelopes describe what browser peers
//! conventionally exchange through it.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Text of the welcome system message sent to every new connection.
pub const WELCOME_TEXT: &str = "Connected to signaling server";

/// Reserved envelope `type` values.
pub mod ws_types {
    pub const SYSTEM: &str = "system";
    pub const MESSAGE: &str = "message";
}

/// Current UTC time as ISO-8601 with millisecond precision (`2024-01-01T00:00:00.000Z`).
pub fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Server-originated envelope, unicast to a single connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub r#type: String,
    pub message: String,
    pub timestamp: String,
}

impl SystemMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            r#type: ws_types::SYSTEM.to_string(),
            message: message.into(),
            timestamp: iso8601_now(),
        }
    }

    /// The acknowledgement a client receives right after it is registered.
    pub fn welcome() -> Self {
        Self::new(WELCOME_TEXT)
    }

    pub fn to_json(&self) -> String {
        // Three string fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Application-level chat envelope (`{ "type": "message", ... }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub r#type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            r#type: ws_types::MESSAGE.to_string(),
            text: text.into(),
            timestamp: Some(iso8601_now()),
        }
    }
}

/// Envelopes peers exchange through the relay, by convention only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalEnvelope {
    Offer { offer: serde_json::Value },
    Answer { answer: serde_json::Value },
    Ice { ice: serde_json::Value },
    System(SystemMessage),
    Chat(ChatMessage),
}

impl SignalEnvelope {
    /// Best-effort classification of a text frame; `None` for anything unrecognised.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Ice { .. } => "ice",
            Self::System(_) => ws_types::SYSTEM,
            Self::Chat(_) => ws_types::MESSAGE,
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub clients: usize,
    pub service: String,
}

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub websocket: String,
    pub health: String,
    pub timestamp: String,
}

/// JSON error body for non-upgrade requests to the WebSocket path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
