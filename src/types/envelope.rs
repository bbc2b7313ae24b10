//! Raw agent envelopes.
//!
//! The agent service owns the `message_type` vocabulary and grows it over
//! time, so an envelope is kept as the JSON it arrived as and only its
//! discriminator is interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator of a raw envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Assistant message carrying a function call.
    Message,
    /// Assistant text sent without the function-call wrapper.
    AssistantText,
    ToolReturn,
    Reasoning,
    Heartbeat,
    Error,
    Stop,
    /// Anything this relay does not recognize.
    Other(String),
}

impl EnvelopeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "function_call" | "tool_call_message" | "tool_call" | "message" => Self::Message,
            "assistant_message" => Self::AssistantText,
            "function_return" | "tool_return_message" | "tool_return" => Self::ToolReturn,
            "internal_monologue" | "reasoning_message" | "hidden_reasoning_message" | "reasoning" => {
                Self::Reasoning
            }
            "heartbeat" | "ping" => Self::Heartbeat,
            "error_message" | "error" => Self::Error,
            "stop_reason" | "stop" => Self::Stop,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One unit of agent output, as returned by a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEnvelope(pub Value);

impl RawEnvelope {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Envelope id, used as the poll cursor.
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// The raw discriminator (`message_type`, or `kind` for older servers).
    pub fn tag(&self) -> Option<&str> {
        self.str_field("message_type").or_else(|| self.str_field("kind"))
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.tag() {
            Some(tag) => EnvelopeKind::from_tag(tag),
            None => EnvelopeKind::Other(String::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawEnvelope {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Result of one poll round.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollBatch {
    pub envelopes: Vec<RawEnvelope>,
    /// Cursor to pass to the next poll.
    pub cursor: Option<String>,
    /// No further envelopes will be produced for this run.
    pub is_final: bool,
}
