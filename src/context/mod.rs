//! Context formatting: tool results → tagged context block → agent messages.
//!
//! The block layout is fixed and consumed literally by the agent's prompt:
//!
//! ```text
//! Use the following context as your learned knowledge, inside <context></context> XML tags.
//! <context>
//! <source><source_id>https://x</source_id><source_context>weather is sunny</source_context></source>
//! </context>
//! ```
//!
//! Content is never escaped. [`parse_context`] cannot recover content that
//! itself contains `</source_context></source>` followed by a newline, or a
//! source id containing `</source_id>`.

pub mod inbound;

pub use inbound::{tool_results_from_messages, TurnInvocation};

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ToolResult, TurnRequest};

/// Sentence preceding every context block.
pub const CONTEXT_PREAMBLE: &str =
    "Use the following context as your learned knowledge, inside <context></context> XML tags.";

/// Render tool results as one context block.
///
/// Returns `None` when there are no results. Each result becomes its own
/// `<source>` block in input order; duplicate ids are not merged. An optional
/// instruction is appended after the closing tag.
pub fn format_context(results: &[ToolResult], instruction: Option<&str>) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut block = String::with_capacity(
        CONTEXT_PREAMBLE.len()
            + 32
            + results
                .iter()
                .map(|r| r.source_id.len() + r.content.len() + 64)
                .sum::<usize>(),
    );
    block.push_str(CONTEXT_PREAMBLE);
    block.push_str("\n<context>\n");
    for result in results {
        block.push_str("<source><source_id>");
        block.push_str(&result.source_id);
        block.push_str("</source_id><source_context>");
        block.push_str(&result.content);
        block.push_str("</source_context></source>\n");
    }
    block.push_str("</context>");

    if let Some(instruction) = instruction.map(str::trim).filter(|i| !i.is_empty()) {
        block.push('\n');
        block.push_str(instruction);
    }
    Some(block)
}

/// Recover the `(source_id, content)` pairs from a formatted block.
pub fn parse_context(block: &str) -> Vec<ToolResult> {
    static SOURCE: OnceLock<Regex> = OnceLock::new();
    let re = SOURCE.get_or_init(|| {
        Regex::new(
            r"(?s)<source><source_id>(.*?)</source_id><source_context>(.*?)</source_context></source>\n",
        )
        .expect("static source pattern")
    });

    let Some(start) = block.find("<context>\n") else {
        return Vec::new();
    };
    let body = &block[start + "<context>\n".len()..];
    let end = body.rfind("</context>").unwrap_or(body.len());

    re.captures_iter(&body[..end])
        .map(|caps| ToolResult::new(&caps[1], &caps[2]))
        .collect()
}

/// Role of a message submitted to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    System,
    User,
}

/// A message in the agent's request schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: AgentRole,
    pub content: String,
}

/// The system/user message pair for a turn, system first when present.
pub fn to_agent_messages(request: &TurnRequest) -> Vec<AgentMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = request.system_context.as_deref().filter(|c| !c.is_empty()) {
        messages.push(AgentMessage {
            role: AgentRole::System,
            content: context.to_string(),
        });
    }
    messages.push(AgentMessage {
        role: AgentRole::User,
        content: request.user_text.clone(),
    });
    messages
}
