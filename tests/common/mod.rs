//! Shared test helpers and a scripted agent transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use letta_relay::config::RelayConfig;
use letta_relay::error::RelayError;
use letta_relay::relay::StreamRelay;
use letta_relay::transport::AgentTransport;
use letta_relay::types::*;
use letta_relay::util::retry::RetryPolicy;

/// One scripted answer to `poll`.
pub enum PollStep {
    Batch(PollBatch),
    Fail(fn() -> RelayError),
}

/// A transport that replays a queue of poll answers.
///
/// Once the queue is empty every further poll returns an empty, non-final
/// batch, so a relay keeps polling until cancelled or bounded.
pub struct ScriptedTransport {
    send_error: Mutex<Option<RelayError>>,
    steps: Mutex<VecDeque<PollStep>>,
    poll_times: Mutex<Vec<Instant>>,
    cursors: Mutex<Vec<Option<String>>>,
    sent: Mutex<Vec<TurnRequest>>,
    send_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            send_error: Mutex::new(None),
            steps: Mutex::new(VecDeque::new()),
            poll_times: Mutex::new(Vec::new()),
            cursors: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
        }
    }

    /// Make `send_turn` fail with `err`.
    pub fn failing_send(self, err: RelayError) -> Self {
        *self.send_error.lock().unwrap() = Some(err);
        self
    }

    /// Queue a batch of envelopes; the cursor is the last envelope's id.
    pub fn then_batch(self, envelopes: Vec<Value>, is_final: bool) -> Self {
        let cursor = envelopes
            .last()
            .and_then(|e| e.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let batch = PollBatch {
            envelopes: envelopes.into_iter().map(RawEnvelope::new).collect(),
            cursor,
            is_final,
        };
        self.steps.lock().unwrap().push_back(PollStep::Batch(batch));
        self
    }

    /// Queue `count` failed polls.
    pub fn then_fail(self, count: usize, err: fn() -> RelayError) -> Self {
        {
            let mut steps = self.steps.lock().unwrap();
            for _ in 0..count {
                steps.push_back(PollStep::Fail(err));
            }
        }
        self
    }

    pub fn poll_count(&self) -> usize {
        self.poll_times.lock().unwrap().len()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }

    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<TurnRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn send_turn(&self, request: &TurnRequest) -> Result<RunHandle, RelayError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.send_error.lock().unwrap().take() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(RunHandle::new("run-1", request.conversation_id.clone()))
    }

    async fn poll(&self, _handle: &RunHandle, cursor: Option<&str>) -> Result<PollBatch, RelayError> {
        self.poll_times.lock().unwrap().push(Instant::now());
        self.cursors.lock().unwrap().push(cursor.map(str::to_string));
        match self.steps.lock().unwrap().pop_front() {
            Some(PollStep::Batch(batch)) => Ok(batch),
            Some(PollStep::Fail(err)) => Err(err()),
            None => Ok(PollBatch {
                cursor: cursor.map(str::to_string),
                ..PollBatch::default()
            }),
        }
    }
}

pub fn test_config() -> RelayConfig {
    RelayConfig::new("http://agent.test", "agent-1")
        .with_poll_interval(Duration::from_millis(100))
        .with_retry_policy(RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        })
        .with_turn_timeout(None)
}

pub fn relay_with(transport: Arc<ScriptedTransport>, config: RelayConfig) -> StreamRelay {
    StreamRelay::new(transport, Arc::new(config))
}

pub fn turn() -> TurnRequest {
    TurnRequest::builder()
        .user_text("what's the weather")
        .agent_id("agent-1")
        .conversation_id("conv-1")
        .build()
}

// Envelope builders in the current agent vocabulary.

pub fn reasoning(id: &str) -> Value {
    json!({"id": id, "message_type": "reasoning_message", "reasoning": "thinking..."})
}

pub fn send_message(id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "message_type": "tool_call_message",
        "tool_call": {
            "name": "send_message",
            "arguments": json!({"message": text}).to_string(),
            "tool_call_id": format!("call-{id}")
        }
    })
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "id": id,
        "message_type": "tool_call_message",
        "tool_call": {
            "name": name,
            "arguments": arguments.to_string(),
            "tool_call_id": format!("call-{id}")
        }
    })
}

pub fn tool_return(id: &str, name: &str, value: &str) -> Value {
    json!({
        "id": id,
        "message_type": "tool_return_message",
        "name": name,
        "tool_return": value,
        "status": "success"
    })
}

pub fn stop(id: &str) -> Value {
    json!({"id": id, "message_type": "stop_reason", "stop_reason": "end_turn"})
}
