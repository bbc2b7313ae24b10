//! Session metrics, recorded through the `metrics` facade.
//!
//! With the `metrics` feature disabled every recorder here is a no-op. With it
//! enabled, values go to whatever recorder the embedding application has
//! installed (for example `metrics-exporter-prometheus`); the library never
//! installs one itself.

use std::time::Duration;

use crate::error::ErrorCategory;
use crate::types::NormalizedEvent;

/// Finished sessions (counter, labels: outcome).
pub const SESSIONS_TOTAL: &str = "letta_relay_sessions_total";
/// Time from turn acceptance to the terminal event (histogram, labels: outcome).
pub const SESSION_DURATION_SECONDS: &str = "letta_relay_session_duration_seconds";
/// Sessions ended by an error (counter, labels: category).
pub const ERRORS_TOTAL: &str = "letta_relay_errors_total";
/// Poll attempts retried after a transient failure (counter).
pub const POLL_RETRIES_TOTAL: &str = "letta_relay_poll_retries_total";
/// Tool calls relayed from the agent (counter, labels: tool).
pub const TOOL_CALLS_TOTAL: &str = "letta_relay_tool_calls_total";
/// Tool results relayed from the agent (counter, labels: tool, status).
pub const TOOL_RESULTS_TOTAL: &str = "letta_relay_tool_results_total";

/// Record a finished session. `elapsed` is `None` when the turn was never
/// accepted.
#[cfg(feature = "metrics")]
pub fn record_session(outcome: &'static str, elapsed: Option<Duration>) {
    ::metrics::counter!(SESSIONS_TOTAL, "outcome" => outcome).increment(1);
    if let Some(elapsed) = elapsed {
        ::metrics::histogram!(SESSION_DURATION_SECONDS, "outcome" => outcome)
            .record(elapsed.as_secs_f64());
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_session(_outcome: &'static str, _elapsed: Option<Duration>) {}

#[cfg(feature = "metrics")]
pub fn record_error(category: ErrorCategory) {
    ::metrics::counter!(ERRORS_TOTAL, "category" => category.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn record_error(_category: ErrorCategory) {}

#[cfg(feature = "metrics")]
pub fn record_retry() {
    ::metrics::counter!(POLL_RETRIES_TOTAL).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn record_retry() {}

/// Count tool calls and tool results among relayed events.
#[cfg(feature = "metrics")]
pub fn record_event(event: &NormalizedEvent) {
    use crate::types::EventType;

    let tool = || event.str_field("name").unwrap_or("unknown").to_string();
    match event.event_type {
        EventType::ChatToolCall => {
            ::metrics::counter!(TOOL_CALLS_TOTAL, "tool" => tool()).increment(1);
        }
        EventType::ChatToolResult => {
            let status = event.str_field("status").unwrap_or("unknown").to_string();
            ::metrics::counter!(TOOL_RESULTS_TOTAL, "tool" => tool(), "status" => status)
                .increment(1);
        }
        _ => {}
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_event(_event: &NormalizedEvent) {}
