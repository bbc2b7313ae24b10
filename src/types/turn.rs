//! Turn requests and the tool results that feed them.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output of one front-end tool execution, already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub source_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(source_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            content: content.into(),
        }
    }
}

/// One caller turn, fixed at construction.
///
/// Example:
/// ```
/// use letta_relay::types::TurnRequest;
///
/// let request = TurnRequest::builder()
///     .user_text("what's the weather")
///     .agent_id("agent-123")
///     .conversation_id("chat-1")
///     .build();
/// assert!(request.system_context.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct TurnRequest {
    #[builder(into)]
    pub system_context: Option<String>,
    #[builder(into)]
    pub user_text: String,
    #[builder(into)]
    pub agent_id: String,
    #[builder(into)]
    pub conversation_id: String,
}

/// Opaque handle for a submitted turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub conversation_id: String,
    pub accepted_at: DateTime<Utc>,
}

impl RunHandle {
    pub fn new(run_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            conversation_id: conversation_id.into(),
            accepted_at: Utc::now(),
        }
    }

    /// Wall-clock time since the agent accepted the turn.
    pub fn elapsed(&self) -> std::time::Duration {
        (Utc::now() - self.accepted_at).to_std().unwrap_or_default()
    }
}

/// Server-side status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}
