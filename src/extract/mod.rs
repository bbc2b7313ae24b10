//! Envelope extraction: one raw agent envelope → zero or one normalized event.
//!
//! Extraction never fails. Envelopes that are irrelevant to the caller
//! (reasoning, heartbeats) or unknown to this relay produce nothing.

use serde_json::Value;

use crate::config::{RelayConfig, DEFAULT_ASSISTANT_KWARG, DEFAULT_ASSISTANT_TOOL};
use crate::error::ErrorCategory;
use crate::types::{EnvelopeKind, NormalizedEvent, RawEnvelope};

/// Maps envelopes onto normalized events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeExtractor {
    assistant_tool: String,
    assistant_kwarg: String,
}

impl Default for EnvelopeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ASSISTANT_TOOL, DEFAULT_ASSISTANT_KWARG)
    }
}

impl EnvelopeExtractor {
    /// `assistant_tool` is the function the agent calls to talk to the user;
    /// `assistant_kwarg` is the argument holding the text.
    pub fn new(assistant_tool: impl Into<String>, assistant_kwarg: impl Into<String>) -> Self {
        Self {
            assistant_tool: assistant_tool.into(),
            assistant_kwarg: assistant_kwarg.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.assistant_message_tool_name.clone(),
            config.assistant_message_tool_kwarg.clone(),
        )
    }

    pub fn extract(&self, envelope: &RawEnvelope) -> Option<NormalizedEvent> {
        match envelope.kind() {
            EnvelopeKind::Message => self.function_call(envelope),
            EnvelopeKind::AssistantText => assistant_text(envelope).map(NormalizedEvent::delta),
            EnvelopeKind::ToolReturn => Some(tool_return(envelope)),
            EnvelopeKind::Error => Some(error(envelope)),
            EnvelopeKind::Stop => Some(NormalizedEvent::done(
                envelope
                    .str_field("stop_reason")
                    .or_else(|| envelope.str_field("reason")),
            )),
            EnvelopeKind::Reasoning | EnvelopeKind::Heartbeat | EnvelopeKind::Other(_) => None,
        }
    }

    fn function_call(&self, envelope: &RawEnvelope) -> Option<NormalizedEvent> {
        let call = envelope
            .get("tool_call")
            .or_else(|| envelope.get("function_call"))
            .or_else(|| first_call(envelope.get("tool_calls")))?;
        let name = call.get("name").and_then(Value::as_str)?;
        let arguments = call.get("arguments").cloned().unwrap_or(Value::Null);

        if name == self.assistant_tool {
            return self.message_argument(&arguments).map(NormalizedEvent::delta);
        }

        let call_id = call
            .get("tool_call_id")
            .or_else(|| call.get("id"))
            .and_then(Value::as_str);
        Some(NormalizedEvent::tool_call(name, arguments, call_id))
    }

    /// Text of a `send_message` call. Arguments arrive either JSON-encoded
    /// in a string or as an object; undecodable or empty text yields nothing.
    fn message_argument(&self, arguments: &Value) -> Option<String> {
        let decoded;
        let args = match arguments {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw).ok()?;
                &decoded
            }
            other => other,
        };
        args.get(&self.assistant_kwarg)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

fn first_call(calls: Option<&Value>) -> Option<&Value> {
    let call = calls?.as_array()?.first()?;
    Some(call.get("function").unwrap_or(call))
}

fn assistant_text(envelope: &RawEnvelope) -> Option<String> {
    let content = envelope
        .get("content")
        .or_else(|| envelope.get("assistant_message"))?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<String>(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn tool_return(envelope: &RawEnvelope) -> NormalizedEvent {
    let value = envelope
        .get("tool_return")
        .or_else(|| envelope.get("function_return"))
        .cloned()
        .unwrap_or(Value::Null);
    let name = envelope
        .str_field("name")
        .or_else(|| envelope.str_field("tool_name"));
    let event = NormalizedEvent::tool_result(name, value, envelope.str_field("status"));
    match envelope.str_field("tool_call_id") {
        Some(id) => event.with("tool_call_id", id),
        None => event,
    }
}

fn error(envelope: &RawEnvelope) -> NormalizedEvent {
    let code = envelope
        .str_field("error_type")
        .or_else(|| envelope.str_field("code"))
        .unwrap_or_default();
    let message = envelope
        .str_field("message")
        .or_else(|| envelope.str_field("detail"))
        .unwrap_or("agent reported an error");
    NormalizedEvent::error(ErrorCategory::from_code(code), message)
}
