//! Conversion of a front-end turn into a [`TurnRequest`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::types::{ChatMessage, ChatRole, ToolResult, TurnRequest};

use super::format_context;

/// What the front-end hands the relay for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInvocation {
    pub user_text: String,
    /// Prior conversation. Only trailing tool results are used.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Sources the front-end materialized itself (e.g. web search hits).
    #[serde(default)]
    pub sources: Vec<ToolResult>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl TurnInvocation {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..Default::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_source(mut self, source: ToolResult) -> Self {
        self.sources.push(source);
        self
    }

    /// Tool results feeding the context block: trailing tool messages first,
    /// then explicit sources, both in order.
    pub fn tool_results(&self) -> Vec<ToolResult> {
        let mut results = tool_results_from_messages(&self.messages);
        results.extend(self.sources.iter().cloned());
        results
    }

    /// Build the immutable request for `config`'s agent.
    pub fn into_request(self, config: &RelayConfig) -> TurnRequest {
        let results = self.tool_results();
        let system_context = format_context(&results, self.instruction.as_deref());
        let conversation_id = self
            .conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        TurnRequest::builder()
            .maybe_system_context(system_context)
            .user_text(self.user_text)
            .agent_id(config.agent_id.clone())
            .conversation_id(conversation_id)
            .build()
    }
}

/// Collect the tool results at the tail of a conversation.
///
/// The source id is the tool call id, else the tool name, else `tool-<n>`.
pub fn tool_results_from_messages(messages: &[ChatMessage]) -> Vec<ToolResult> {
    let tail_start = messages
        .iter()
        .rposition(|m| m.role != ChatRole::Tool)
        .map(|i| i + 1)
        .unwrap_or(0);
    messages[tail_start..]
        .iter()
        .enumerate()
        .map(|(n, msg)| {
            let source_id = msg
                .tool_call_id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| msg.name.clone().filter(|name| !name.is_empty()))
                .unwrap_or_else(|| format!("tool-{}", n + 1));
            ToolResult::new(source_id, msg.content.clone())
        })
        .collect()
}
