//! Caller-facing error classification.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category reported in `chat_error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Authentication,
    Parse,
    Execution,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    /// Classify an error code reported by the agent service.
    ///
    /// The agent owns this vocabulary, so matching is by keyword and anything
    /// unrecognized falls back to [`ErrorCategory::Unknown`].
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if code.is_empty() {
            return Self::Unknown;
        }
        if let Ok(exact) = code.parse::<ErrorCategory>() {
            return exact;
        }
        const CONNECTION: &[&str] = &["connect", "network", "timeout", "timed_out", "unavailable", "rate_limit"];
        const PARSE: &[&str] = &["parse", "json", "decode", "schema", "format", "invalid_response"];
        const EXECUTION: &[&str] = &["execution", "tool", "function", "internal", "llm", "context_window"];
        const AUTH: &[&str] = &["auth", "credential", "permission", "forbidden", "unauthorized"];

        if CONNECTION.iter().any(|k| code.contains(k)) {
            Self::Connection
        } else if PARSE.iter().any(|k| code.contains(k)) {
            Self::Parse
        } else if AUTH.iter().any(|k| code.contains(k)) {
            Self::Authentication
        } else if EXECUTION.iter().any(|k| code.contains(k)) {
            Self::Execution
        } else {
            Self::Unknown
        }
    }
}
