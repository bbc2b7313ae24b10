//! Stream relay: drives one turn from submission to its terminal event.
//!
//! A session moves `Starting → Streaming → {Done, Failed, Cancelled}`. Every
//! path except cancellation ends with exactly one terminal event
//! (`chat_done` or `chat_error`); a cancelled session just stops.

use std::sync::Arc;

use futures::stream::BoxStream;
use strum::Display;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::RelayConfig;
use crate::context::TurnInvocation;
use crate::error::{ErrorCategory, RelayError};
use crate::extract::EnvelopeExtractor;
use crate::transport::AgentTransport;
use crate::types::{EventType, NormalizedEvent, PollBatch, RunHandle, TurnRequest};
use crate::util::metrics;
use crate::util::timeout::with_deadline;

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RelayState {
    Starting,
    Streaming,
    Done,
    Failed,
    Cancelled,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Turns a [`TurnRequest`] into an ordered stream of normalized events.
///
/// Sessions share nothing but the transport (and its connection pool), so
/// one relay can serve any number of concurrent turns.
#[derive(Clone)]
pub struct StreamRelay {
    transport: Arc<dyn AgentTransport>,
    config: Arc<RelayConfig>,
    extractor: EnvelopeExtractor,
}

impl StreamRelay {
    pub fn new(transport: Arc<dyn AgentTransport>, config: Arc<RelayConfig>) -> Self {
        let extractor = EnvelopeExtractor::from_config(&config);
        Self {
            transport,
            config,
            extractor,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Build the request from a front-end invocation, then relay it.
    pub fn relay_invocation(
        &self,
        invocation: TurnInvocation,
        cancel: CancellationToken,
    ) -> BoxStream<'static, NormalizedEvent> {
        let request = invocation.into_request(&self.config);
        self.relay(request, cancel)
    }

    /// Submit `request` and stream its events.
    ///
    /// The stream is lazy: nothing is sent until it is first polled. Events
    /// are yielded as soon as their envelope is extracted. Cancelling `cancel`
    /// ends the stream at the next loop boundary (before a poll, during the
    /// inter-poll wait or a retry backoff, or between events of a batch)
    /// without a terminal event.
    pub fn relay(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, NormalizedEvent> {
        let mut session = RelaySession {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
            extractor: self.extractor.clone(),
            cancel,
            state: RelayState::Starting,
            accepted: None,
            cursor: None,
            polls: 0,
        };

        let stream = async_stream::stream! {
            let handle = match session.start(&request).await {
                Ok(Some(handle)) => handle,
                Ok(None) => return,
                Err(err) => {
                    session.fail(&err);
                    yield NormalizedEvent::from(&err);
                    return;
                }
            };

            if session.config.announce_start {
                yield NormalizedEvent::start(&handle.run_id, &handle.conversation_id);
            }

            let interval = session.config.poll_interval;
            let deadline = session.config.turn_timeout.map(|t| Instant::now() + t);
            loop {
                let batch = match session.next_batch(&handle, deadline).await {
                    Ok(Some(batch)) => batch,
                    Ok(None) => return,
                    Err(err) => {
                        session.fail(&err);
                        yield NormalizedEvent::from(&err);
                        return;
                    }
                };

                for envelope in &batch.envelopes {
                    if session.cancel.is_cancelled() {
                        session.cancelled();
                        return;
                    }
                    let Some(event) = session.extractor.extract(envelope) else {
                        trace!(
                            run_id = %handle.run_id,
                            kind = envelope.tag().unwrap_or("<untagged>"),
                            "Dropped envelope"
                        );
                        continue;
                    };
                    metrics::record_event(&event);
                    let terminal = event.is_terminal();
                    if terminal {
                        session.finish(&event);
                    }
                    yield event;
                    if terminal {
                        return;
                    }
                }

                if batch.is_final {
                    let event = NormalizedEvent::done(None);
                    session.finish(&event);
                    yield event;
                    return;
                }

                if !session.wait(interval, deadline).await {
                    return;
                }
            }
        };

        Box::pin(stream)
    }
}

/// Transient state for one turn. Dropped with the stream.
struct RelaySession {
    transport: Arc<dyn AgentTransport>,
    config: Arc<RelayConfig>,
    extractor: EnvelopeExtractor,
    cancel: CancellationToken,
    state: RelayState,
    accepted: Option<RunHandle>,
    cursor: Option<String>,
    polls: u32,
}

impl RelaySession {
    /// Submit the turn. `Ok(None)` means the session was cancelled first.
    async fn start(&mut self, request: &TurnRequest) -> Result<Option<RunHandle>, RelayError> {
        if self.cancel.is_cancelled() {
            self.cancelled();
            return Ok(None);
        }
        let handle = self.transport.send_turn(request).await?;
        debug!(
            run_id = %handle.run_id,
            conversation_id = %handle.conversation_id,
            "Turn accepted"
        );
        self.accepted = Some(handle.clone());
        if self.cancel.is_cancelled() {
            self.cancelled();
            return Ok(None);
        }
        self.state = RelayState::Streaming;
        Ok(Some(handle))
    }

    /// One poll, retried on transient failure from the same cursor.
    ///
    /// The whole retry run, backoff sleeps included, ends at `deadline`.
    async fn next_batch(
        &mut self,
        handle: &RunHandle,
        deadline: Option<Instant>,
    ) -> Result<Option<PollBatch>, RelayError> {
        if self.cancel.is_cancelled() {
            self.cancelled();
            return Ok(None);
        }
        let budget = self.config.turn_timeout.unwrap_or_default();
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(RelayError::Timeout(budget.as_millis() as u64));
        }
        if let Some(max) = self.config.max_polls {
            if self.polls >= max {
                return Err(RelayError::PollLimit(self.polls));
            }
        }
        self.polls += 1;

        let transport = Arc::clone(&self.transport);
        let cursor = self.cursor.clone();
        let poll = self
            .config
            .retry
            .execute(&self.cancel, || transport.poll(handle, cursor.as_deref()));
        let result = match deadline {
            Some(deadline) => with_deadline(deadline, budget, poll).await,
            None => poll.await,
        };

        match result {
            Ok(batch) => {
                debug!(
                    run_id = %handle.run_id,
                    poll = self.polls,
                    batch = batch.envelopes.len(),
                    is_final = batch.is_final,
                    "Poll batch"
                );
                if batch.cursor.is_some() {
                    self.cursor = batch.cursor.clone();
                }
                Ok(Some(batch))
            }
            Err(RelayError::Cancelled) => {
                self.cancelled();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Sleep between polls, never past `deadline`. Returns `false` if
    /// cancelled meanwhile.
    async fn wait(&mut self, interval: std::time::Duration, deadline: Option<Instant>) -> bool {
        let mut wake = Instant::now() + interval;
        if let Some(deadline) = deadline {
            wake = wake.min(deadline);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.cancelled();
                false
            }
            _ = tokio::time::sleep_until(wake) => true,
        }
    }

    fn elapsed(&self) -> Option<std::time::Duration> {
        self.accepted.as_ref().map(RunHandle::elapsed)
    }

    fn finish(&mut self, event: &NormalizedEvent) {
        self.state = if event.event_type == EventType::ChatError {
            if let Some(category) = event.str_field("category") {
                metrics::record_error(ErrorCategory::from_code(category));
            }
            RelayState::Failed
        } else {
            RelayState::Done
        };
        let elapsed = self.elapsed();
        info!(
            state = %self.state,
            polls = self.polls,
            elapsed_ms = elapsed.map(|d| d.as_millis() as u64),
            "Relay session ended"
        );
        metrics::record_session(self.outcome(), elapsed);
    }

    fn fail(&mut self, err: &RelayError) {
        let from = self.state;
        self.state = RelayState::Failed;
        let elapsed = self.elapsed();
        error!(
            %from,
            polls = self.polls,
            elapsed_ms = elapsed.map(|d| d.as_millis() as u64),
            error = %err,
            "Relay session failed"
        );
        metrics::record_error(err.category());
        metrics::record_session(self.outcome(), elapsed);
    }

    fn cancelled(&mut self) {
        self.state = RelayState::Cancelled;
        debug!(polls = self.polls, "Relay session cancelled");
        metrics::record_session(self.outcome(), self.elapsed());
    }

    fn outcome(&self) -> &'static str {
        match self.state {
            RelayState::Done => "done",
            RelayState::Failed => "failed",
            RelayState::Cancelled => "cancelled",
            RelayState::Starting | RelayState::Streaming => "active",
        }
    }
}
