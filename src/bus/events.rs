use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Key/value payload carried by every event
pub type Payload = Map<String, Value>;

/// Kind of event flowing over the command bus
///
/// The bus itself never looks inside payloads. Only two kinds carry a field
/// the core reads: `Speech` (the `text` field, consumed by the speech
/// dispatcher) and `Error` (the `message` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Text meant to be spoken
    Speech,
    /// Agent or workflow status update
    Status,
    /// Progress indicator, optionally with a percentage
    Progress,
    /// Incremental piece of a streamed response
    Token,
    /// An agent began working on a sub-task
    AgentStart,
    /// An agent finished a sub-task
    AgentDone,
    /// Something went wrong
    Error,
    /// A tool invocation started
    ToolStart,
    /// A tool invocation finished
    ToolComplete,
    /// Agent-specific display data (weather report, calendar listing, ...)
    Card,
}

impl EventKind {
    /// Kinds forwarded to live text dashboards
    pub const STREAMING: [EventKind; 6] = [
        EventKind::Speech,
        EventKind::Token,
        EventKind::Status,
        EventKind::Progress,
        EventKind::AgentStart,
        EventKind::AgentDone,
    ];

    pub fn is_streaming(&self) -> bool {
        Self::STREAMING.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Speech => "speech",
            EventKind::Status => "status",
            EventKind::Progress => "progress",
            EventKind::Token => "token",
            EventKind::AgentStart => "agent_start",
            EventKind::AgentDone => "agent_done",
            EventKind::Error => "error",
            EventKind::ToolStart => "tool_start",
            EventKind::ToolComplete => "tool_complete",
            EventKind::Card => "card",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, timestamped message published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a fresh id and the current time
    pub fn new(kind: EventKind, payload: Payload, source: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Text of a speech event
    pub fn speech_text(&self) -> Option<&str> {
        match self.kind {
            EventKind::Speech => self.payload.get("text").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Message of an error event
    pub fn error_message(&self) -> Option<&str> {
        match self.kind {
            EventKind::Error => self.payload.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Serialize for transport (SSE, WebSocket)
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| json!({ "id": self.id }).to_string())
    }
}

/// Convert a `json!` object literal into a payload; anything else is wrapped under `value`
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

pub fn speech_payload(text: &str) -> Payload {
    payload(json!({ "text": text }))
}

pub fn status_payload(message: &str) -> Payload {
    payload(json!({ "message": message }))
}

pub fn progress_payload(message: &str, percentage: Option<f32>) -> Payload {
    let mut map = payload(json!({ "message": message }));
    if let Some(pct) = percentage {
        map.insert("percentage".to_string(), json!(pct));
    }
    map
}

pub fn token_payload(token: &str) -> Payload {
    payload(json!({ "token": token }))
}

pub fn error_payload(message: &str) -> Payload {
    payload(json!({ "message": message }))
}
