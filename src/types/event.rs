//! Normalized events: the only thing a caller of the relay observes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{ErrorCategory, RelayError};

/// Type of a normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    ChatStart,
    ChatDelta,
    ChatToolCall,
    ChatToolResult,
    ChatError,
    ChatDone,
}

impl EventType {
    /// `chat_done` and `chat_error` end a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ChatDone | Self::ChatError)
    }
}

/// A caller-facing event: `{ "type": ..., "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl NormalizedEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            data: Map::new(),
        }
    }

    /// Attach a data field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn start(run_id: &str, conversation_id: &str) -> Self {
        Self::new(EventType::ChatStart)
            .with("run_id", run_id)
            .with("conversation_id", conversation_id)
    }

    pub fn delta(text: impl Into<String>) -> Self {
        Self::new(EventType::ChatDelta).with("content", text.into())
    }

    /// Tool invocation requested by the agent. `arguments` is passed through
    /// exactly as the agent encoded it.
    pub fn tool_call(name: &str, arguments: Value, call_id: Option<&str>) -> Self {
        let event = Self::new(EventType::ChatToolCall)
            .with("name", name)
            .with("arguments", arguments);
        match call_id {
            Some(id) => event.with("tool_call_id", id),
            None => event,
        }
    }

    pub fn tool_result(name: Option<&str>, value: Value, status: Option<&str>) -> Self {
        let mut event = Self::new(EventType::ChatToolResult)
            .with("name", name.map(Value::from).unwrap_or(Value::Null))
            .with("result", value);
        if let Some(status) = status {
            event = event.with("status", status);
        }
        event
    }

    pub fn error(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::new(EventType::ChatError)
            .with("message", message.into())
            .with("category", category.to_string())
    }

    pub fn done(reason: Option<&str>) -> Self {
        let event = Self::new(EventType::ChatDone);
        match reason {
            Some(reason) => event.with("reason", reason),
            None => event,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

impl From<&RelayError> for NormalizedEvent {
    fn from(err: &RelayError) -> Self {
        Self::error(err.category(), err.to_string())
    }
}
