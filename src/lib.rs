//! letta-relay: streaming relay between tool-calling chat front-ends and a
//! poll-only Letta agent.
//!
//! A turn is submitted once with its tool results rendered into a context
//! block; the agent's output is then fetched by polling, each envelope is
//! mapped onto a small set of chat events, and the caller consumes them as
//! an ordered stream that always ends in `chat_done` or `chat_error`
//! (unless cancelled).
//!
//! # Features
//!
//! - `cli`: the `letta-relay` demo binary.
//! - `metrics`: session, error, retry and tool-call metrics through the
//!   `metrics` facade (see [`util::metrics`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use letta_relay::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> letta_relay::error::Result<()> {
//! let config = Arc::new(RelayConfig::from_env()?);
//! let transport = Arc::new(HttpAgentTransport::new(Arc::clone(&config)));
//! let relay = StreamRelay::new(transport, config);
//!
//! let turn = TurnInvocation::new("what's the weather")
//!     .with_source(ToolResult::new("https://x", "weather is sunny"));
//! let mut events = relay.relay_invocation(turn, CancellationToken::new());
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod prelude;
pub mod relay;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
