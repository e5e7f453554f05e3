//! Wire protocol for the notification socket.
//!
//! Every frame in either direction is a JSON object `{ "type": ..., "data": {...} }`.
//! Inbound frames additionally carry a `timestamp`. The server sends naive UTC
//! times without an offset; when the timestamp is missing or unreadable the
//! receive time is used instead.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Inbound message kinds the client knows about.
pub mod kinds {
    pub const TASK_UPDATE: &str = "task_update";
    pub const DOCUMENT_UPDATE: &str = "document_update";
    pub const RISK_ALERT: &str = "risk_alert";
    pub const COMPLIANCE_ALERT: &str = "compliance_alert";
    pub const CONTRACT_UPDATE: &str = "contract_update";
    pub const MATTER_UPDATE: &str = "matter_update";
    pub const AI_PROGRESS: &str = "ai_progress";
    pub const USER_ACTIVITY: &str = "user_activity";
    pub const SYSTEM_STATUS: &str = "system_status";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const ROOM_SUBSCRIBED: &str = "room_subscribed";
    pub const ROOM_UNSUBSCRIBED: &str = "room_unsubscribed";
    pub const ERROR: &str = "error";
}

/// Payload map carried in the `data` field.
pub type Payload = Map<String, Value>;

// --- Inbound ---

/// A decoded inbound frame. Lives for one receive-and-dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "data", default)]
    pub payload: Payload,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Parse RFC 3339, or a naive ISO-8601 date-time taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now))
}

impl RawMessage {
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Decode a text frame received from the server.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(DecodeError::from)
    }

    /// Payload field as display text. Strings are returned as-is, numbers and
    /// booleans in their JSON form; missing, null and structured values yield `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.payload.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// True when the payload field is the string `expected`.
    pub fn field_is(&self, key: &str, expected: &str) -> bool {
        self.payload.get(key).and_then(Value::as_str) == Some(expected)
    }
}

// --- Outbound ---

/// Generic outbound frame, used for caller-supplied commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Payload,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Payload::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Commands the client sends on its own behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// One-way keepalive probe.
    Heartbeat { timestamp: DateTime<Utc> },
    /// Ask the server for a `system_status` snapshot.
    RequestStatus {},
    SubscribeRoom { room_id: String },
    UnsubscribeRoom { room_id: String },
}

impl ClientCommand {
    pub fn heartbeat() -> Self {
        ClientCommand::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    pub fn subscribe(room_id: impl Into<String>) -> Self {
        ClientCommand::SubscribeRoom {
            room_id: room_id.into(),
        }
    }

    pub fn unsubscribe(room_id: impl Into<String>) -> Self {
        ClientCommand::UnsubscribeRoom {
            room_id: room_id.into(),
        }
    }
}
