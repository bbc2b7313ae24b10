//! Tests for the stream relay over a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::*;
use letta_relay::context::TurnInvocation;
use letta_relay::error::RelayError;
use letta_relay::types::{ChatMessage, EventType, NormalizedEvent, ToolResult};
use letta_relay::util::retry::RetryPolicy;

fn types(events: &[NormalizedEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

fn terminal_count(events: &[NormalizedEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

#[tokio::test(start_paused = true)]
async fn reasoning_is_dropped_across_two_polls() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .then_batch(vec![reasoning("m1"), send_message("m2", "Hello")], false)
            .then_batch(vec![stop("m3")], false),
    );
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            NormalizedEvent::delta("Hello"),
            NormalizedEvent::done(Some("end_turn")),
        ]
    );
    assert_eq!(transport.cursors(), vec![None, Some("m2".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn tool_round_trip_keeps_envelope_order() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(
        vec![
            tool_call("m1", "search", json!({"query": "weather"})),
            tool_return("m2", "search", "result"),
            send_message("m3", "Based on search..."),
            stop("m4"),
        ],
        false,
    ));
    let events: Vec<_> = relay_with(transport, test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        types(&events),
        vec![
            EventType::ChatToolCall,
            EventType::ChatToolResult,
            EventType::ChatDelta,
            EventType::ChatDone,
        ]
    );
    assert_eq!(events[0].str_field("name"), Some("search"));
    assert_eq!(events[0].str_field("arguments"), Some(r#"{"query":"weather"}"#));
    assert_eq!(events[1].str_field("result"), Some("result"));
    assert_eq!(events[2].str_field("content"), Some("Based on search..."));
}

#[tokio::test(start_paused = true)]
async fn nothing_follows_the_terminal_event() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(
        vec![send_message("m1", "a"), stop("m2"), send_message("m3", "late")],
        false,
    ));
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatDelta, EventType::ChatDone]);
    assert_eq!(transport.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn agent_error_envelope_fails_the_session() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(
        vec![
            send_message("m1", "working on it"),
            json!({
                "id": "m2",
                "message_type": "error_message",
                "error_type": "internal_error",
                "message": "agent crashed"
            }),
        ],
        false,
    ));
    let events: Vec<_> = relay_with(transport, test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatDelta, EventType::ChatError]);
    assert_eq!(events[1].str_field("message"), Some("agent crashed"));
    assert_eq!(events[1].str_field("category"), Some("execution"));
}

#[tokio::test(start_paused = true)]
async fn final_batch_without_stop_synthesizes_done() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .then_batch(vec![send_message("m1", "partial")], false)
            .then_batch(vec![reasoning("m2")], true),
    );
    let events: Vec<_> = relay_with(transport, test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatDelta, EventType::ChatDone]);
    assert!(events[1].data.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_growing_gaps() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .then_batch(vec![send_message("m1", "first")], false)
            .then_fail(3, || RelayError::Timeout(1000))
            .then_batch(vec![send_message("m2", "second"), stop("m3")], false),
    );
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            NormalizedEvent::delta("first"),
            NormalizedEvent::delta("second"),
            NormalizedEvent::done(Some("end_turn")),
        ]
    );

    // Every retry re-polls from the cursor of the last delivered batch.
    let cursors = transport.cursors();
    assert_eq!(cursors.len(), 5);
    assert!(cursors[1..].iter().all(|c| c.as_deref() == Some("m1")));

    let times = transport.poll_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    // gaps[0] is the regular poll interval; the rest are backoff delays.
    assert_eq!(gaps[0], Duration::from_millis(100));
    let backoffs = &gaps[1..];
    assert!(backoffs[0] > Duration::from_millis(100));
    assert!(
        backoffs.windows(2).all(|w| w[1] >= w[0]),
        "backoff shrank: {backoffs:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_yield_exactly_one_error() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .then_fail(10, || RelayError::api(503, "unavailable"))
            .then_batch(vec![send_message("m1", "never seen")], false),
    );
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(events[0].str_field("category"), Some("connection"));
    assert!(events[0]
        .str_field("message")
        .is_some_and(|m| m.starts_with("Gave up after 4 attempts")));
    assert_eq!(transport.poll_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_poll_error_is_fatal_at_once() {
    let transport = Arc::new(
        ScriptedTransport::new().then_fail(1, || RelayError::api(404, "Run not found")),
    );
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(events[0].str_field("category"), Some("execution"));
    assert_eq!(transport.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_failure_is_the_only_event() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .failing_send(RelayError::api(500, "boom"))
            .then_batch(vec![send_message("m1", "unused")], false),
    );
    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(transport.poll_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_handle_is_a_parse_error() {
    let transport = Arc::new(
        ScriptedTransport::new().failing_send(RelayError::Protocol("response carries no run id".into())),
    );
    let events: Vec<_> = relay_with(transport, test_config())
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].str_field("category"), Some("parse"));
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_batch_stops_the_stream() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(
        (1..=5)
            .map(|i| send_message(&format!("m{i}"), &format!("part {i}")))
            .collect(),
        false,
    ));
    let cancel = CancellationToken::new();
    let mut stream = relay_with(transport.clone(), test_config()).relay(turn(), cancel.clone());

    assert_eq!(stream.next().await, Some(NormalizedEvent::delta("part 1")));
    assert_eq!(stream.next().await, Some(NormalizedEvent::delta("part 2")));
    cancel.cancel();
    assert_eq!(stream.next().await, None);
    assert_eq!(transport.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_leaves_no_retry_behind() {
    let transport = Arc::new(ScriptedTransport::new().then_fail(10, || RelayError::Timeout(1000)));
    let cancel = CancellationToken::new();
    let stream = relay_with(transport.clone(), test_config()).relay(turn(), cancel.clone());
    let task = tokio::spawn(stream.collect::<Vec<_>>());

    // First poll fails at once; its backoff is at least 150ms.
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let events = task.await.unwrap();

    assert!(events.is_empty());
    assert_eq!(transport.poll_count(), 1);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_while_idle_between_polls() {
    let transport = Arc::new(ScriptedTransport::new());
    let cancel = CancellationToken::new();
    let stream = relay_with(transport.clone(), test_config()).relay(turn(), cancel.clone());
    let task = tokio::spawn(stream.collect::<Vec<_>>());

    tokio::time::sleep(Duration::from_millis(350)).await;
    cancel.cancel();
    let events = task.await.unwrap();

    assert!(events.is_empty());
    let polls = transport.poll_count();
    assert!(polls >= 3, "expected steady polling, saw {polls}");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.poll_count(), polls);
}

#[tokio::test(start_paused = true)]
async fn announce_start_precedes_everything() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(vec![stop("m1")], false));
    let events: Vec<_> = relay_with(transport, test_config().with_announce_start(true))
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatStart, EventType::ChatDone]);
    assert_eq!(events[0].str_field("run_id"), Some("run-1"));
    assert_eq!(events[0].str_field("conversation_id"), Some("conv-1"));
}

#[tokio::test(start_paused = true)]
async fn every_uncancelled_session_ends_with_one_terminal_event() {
    let scripts: Vec<ScriptedTransport> = vec![
        ScriptedTransport::new().then_batch(vec![send_message("m1", "x"), stop("m2")], false),
        ScriptedTransport::new().then_batch(vec![reasoning("m1")], true),
        ScriptedTransport::new().then_fail(10, || RelayError::Timeout(5)),
        ScriptedTransport::new().failing_send(RelayError::Authentication("bad key".into())),
    ];
    for script in scripts {
        let events: Vec<_> = relay_with(Arc::new(script), test_config())
            .relay(turn(), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(terminal_count(&events), 1, "{events:?}");
        assert!(events.last().is_some_and(NormalizedEvent::is_terminal));
    }
}

#[tokio::test(start_paused = true)]
async fn poll_limit_bounds_a_run_that_never_ends() {
    let transport = Arc::new(ScriptedTransport::new());
    let events: Vec<_> = relay_with(transport.clone(), test_config().with_max_polls(Some(5)))
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(events[0].str_field("category"), Some("connection"));
    assert_eq!(transport.poll_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn turn_timeout_cuts_a_retry_run_short() {
    let transport = Arc::new(ScriptedTransport::new().then_fail(20, || RelayError::Timeout(1)));
    let config = test_config()
        .with_retry_policy(RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        })
        .with_turn_timeout(Some(Duration::from_secs(2)));

    let started = tokio::time::Instant::now();
    let events: Vec<_> = relay_with(transport.clone(), config)
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;
    let elapsed = started.elapsed();

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(events[0].str_field("message"), Some("Timeout after 2000ms"));
    assert_eq!(events[0].str_field("category"), Some("connection"));
    assert!(elapsed <= Duration::from_millis(2_050), "ran for {elapsed:?}");
    assert!(transport.poll_count() < 6);
}

#[tokio::test(start_paused = true)]
async fn idle_wait_does_not_overshoot_the_turn_timeout() {
    let transport = Arc::new(ScriptedTransport::new());
    let config = test_config()
        .with_poll_interval(Duration::from_secs(10))
        .with_turn_timeout(Some(Duration::from_secs(3)));

    let started = tokio::time::Instant::now();
    let events: Vec<_> = relay_with(transport.clone(), config)
        .relay(turn(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(types(&events), vec![EventType::ChatError]);
    assert_eq!(events[0].str_field("message"), Some("Timeout after 3000ms"));
    assert!(started.elapsed() <= Duration::from_millis(3_050));
    assert_eq!(transport.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn invocation_submits_context_from_trailing_tool_messages() {
    let transport = Arc::new(ScriptedTransport::new().then_batch(vec![stop("m1")], false));
    let invocation = TurnInvocation::new("what's the weather")
        .with_messages(vec![
            ChatMessage::user("earlier question"),
            ChatMessage::tool("https://x", "weather is sunny"),
        ])
        .with_source(ToolResult::new("doc-2", "bring an umbrella anyway"));

    let events: Vec<_> = relay_with(transport.clone(), test_config())
        .relay_invocation(invocation, CancellationToken::new())
        .collect()
        .await;
    assert_eq!(types(&events), vec![EventType::ChatDone]);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_text, "what's the weather");
    assert_eq!(sent[0].agent_id, "agent-1");
    assert!(!sent[0].conversation_id.is_empty());
    let context = sent[0].system_context.as_deref().unwrap();
    assert!(context.contains(
        "<source><source_id>https://x</source_id><source_context>weather is sunny</source_context></source>"
    ));
    assert!(context.find("https://x").unwrap() < context.find("doc-2").unwrap());
}
