//! Agent transport trait and implementations.

pub mod http;
pub mod letta;

pub use letta::HttpAgentTransport;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::types::{PollBatch, RunHandle, TurnRequest};

/// The network conversation with the agent service.
///
/// The service has no push channel: a turn is submitted once, then its output
/// is fetched by repeated polls. `poll` must be idempotent for a given
/// cursor, returning only envelopes after it, so that a retried poll never
/// duplicates what an earlier successful poll delivered.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Submit a turn and obtain a handle to its run.
    ///
    /// Fails with a transport error on connection failure or non-success
    /// status, and with [`RelayError::Protocol`] when the response is not a
    /// usable handle.
    async fn send_turn(&self, request: &TurnRequest) -> Result<RunHandle, RelayError>;

    /// Fetch the envelopes produced after `cursor`.
    async fn poll(&self, handle: &RunHandle, cursor: Option<&str>) -> Result<PollBatch, RelayError>;
}
