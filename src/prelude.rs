//! Convenience re-exports for common use.

pub use crate::config::{Credential, RelayConfig};
pub use crate::context::{format_context, parse_context, TurnInvocation};
pub use crate::error::{ErrorCategory, RelayError, Result};
pub use crate::extract::EnvelopeExtractor;
pub use crate::relay::{RelayState, StreamRelay};
pub use crate::transport::{AgentTransport, HttpAgentTransport};
pub use crate::types::{
    ChatMessage, ChatRole, EventType, NormalizedEvent, PollBatch, RawEnvelope, RunHandle,
    RunStatus, ToolResult, TurnRequest,
};
pub use crate::util::retry::RetryPolicy;
