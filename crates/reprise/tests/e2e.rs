// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete Reprise pipeline.
//!
//! Each test serves an isolated stack (scripted engine, state machine, hub,
//! runner and gateway) on a loopback port and drives it through the real
//! HTTP client. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use reprise_client::{GenerationClient, SessionMultiplexer, StreamFrame, StreamState, Update};
use reprise_config::model::{ClientConfig, RevealConfig};
use reprise_core::{
    ConversationId, Event, GenerationStatus, MessageId, RepriseError, SessionId, ToolStatus,
};
use reprise_test_utils::harness::ALICE_TOKEN;
use reprise_test_utils::{Step, TestHarness};

async fn follow_into(client: &GenerationClient, id: &MessageId, state: &mut StreamState) {
    let (tx, mut rx) = mpsc::channel(512);
    let reader = {
        let client = client.clone();
        let id = id.clone();
        tokio::spawn(async move { client.follow(&id, tx, CancellationToken::new()).await })
    };
    while let Some(update) = rx.recv().await {
        match update {
            Update::Event(event) => {
                state.apply(event);
            }
            Update::Archived => state.mark_archived(),
        }
    }
    reader.await.unwrap().unwrap();
}

async fn follow_to_end(client: &GenerationClient, id: &MessageId) -> StreamState {
    let mut state = StreamState::new(id.clone());
    follow_into(client, id, &mut state).await;
    state
}

async fn wait_finished(client: &GenerationClient, id: &MessageId) {
    for _ in 0..200 {
        if !client.get_status(id).await.unwrap().active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("generation {id} never finished");
}

async fn start(
    harness: &TestHarness,
    conversation: &ConversationId,
    id: &str,
) -> MessageId {
    harness
        .alice()
        .start(conversation, "prompt", Some(&MessageId::from(id)))
        .await
        .unwrap()
        .message_id
}

// ---- Fresh generation, live viewer ----

#[tokio::test]
async fn live_viewer_sees_the_whole_reply() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::status("writing"),
            Step::content("Hello"),
            Step::content(" world"),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    let state = follow_to_end(&harness.alice(), &id).await;
    assert_eq!(state.status(), GenerationStatus::Completed);
    assert_eq!(state.content().target(), "Hello world");
    assert_eq!(state.content().displayed(), "Hello world");
    assert_eq!(state.status_label(), Some("writing"));
    assert_eq!(state.metadata().unwrap()["steps"], 3);

    harness.shutdown().await.unwrap();
}

// ---- Attach after the generation finished ----

#[tokio::test]
async fn finished_generation_replays_after_the_fact() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![Step::thinking("plan"), Step::content("done")]])
        .with_stream_ready_timeout(Duration::from_millis(10))
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;
    let client = harness.alice();
    wait_finished(&client, &id).await;

    let state = follow_to_end(&client, &id).await;
    assert!(state.is_finished());
    assert_eq!(state.thinking().target(), "plan");
    assert_eq!(state.content().target(), "done");

    let record = client.get_snapshot(&id).await.unwrap();
    assert_eq!(record.content(), "done");
    assert_eq!(record.thinking(), "plan");
}

// ---- Tool and engine failures ----

#[tokio::test]
async fn tool_failure_does_not_end_the_generation() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::tool_start("t1", "search", "web"),
            Step::tool_error("t1", "upstream timeout"),
            Step::content("answered without search"),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    let state = follow_to_end(&harness.alice(), &id).await;
    assert_eq!(state.status(), GenerationStatus::Completed);
    let tool = state.tools().get("t1").unwrap();
    assert_eq!(tool.status, ToolStatus::Failed);
    assert_eq!(state.content().target(), "answered without search");
}

#[tokio::test]
async fn engine_failure_keeps_partial_output() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::content("partial"),
            Step::Fail("model overloaded".into()),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    let state = follow_to_end(&harness.alice(), &id).await;
    assert_eq!(state.status(), GenerationStatus::Error);
    assert!(state.error().is_some());
    assert_eq!(state.content().target(), "partial");
}

// ---- Lifecycle ----

#[tokio::test]
async fn duplicate_start_conflicts_and_stop_completes() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![Step::content("so far"), Step::Hold]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;
    let client = harness.alice();

    let err = client
        .start(&conversation, "again", Some(&id))
        .await
        .unwrap_err();
    assert!(matches!(err, RepriseError::AlreadyExists { .. }), "{err:?}");

    assert!(client.get_status(&id).await.unwrap().active);
    assert!(client.stop(&id).await.unwrap());

    let state = follow_to_end(&client, &id).await;
    assert_eq!(state.status(), GenerationStatus::Completed);
    assert_eq!(state.content().target(), "so far");
    assert_eq!(state.metadata().unwrap()["stopped"], true);
}

#[tokio::test]
async fn other_users_cannot_see_a_generation() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![Step::Hold]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;
    let bob = harness.bob();

    let err = bob.get_status(&id).await.unwrap_err();
    assert!(matches!(err, RepriseError::NotFound { .. }), "{err:?}");
    assert!(matches!(
        bob.attach_stream(&id).await,
        Err(RepriseError::NotFound { .. })
    ));
    assert!(!bob.stop(&id).await.unwrap_or(false));
    assert!(harness.alice().get_status(&id).await.unwrap().active);

    harness.shutdown().await.unwrap();
}

// ---- Reconnects ----

#[tokio::test]
async fn reconnect_resumes_without_gaps_or_duplicates() {
    let first_gate = Arc::new(Notify::new());
    let second_gate = Arc::new(Notify::new());
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::content("one"),
            Step::Pause(first_gate.clone()),
            Step::content(" two"),
            Step::Pause(second_gate.clone()),
            Step::content(" three"),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;
    let client = harness.alice();

    // First viewer reads until "one" arrives, then disconnects.
    let mut state = StreamState::new(id.clone());
    let mut frames = client.attach_stream(&id).await.unwrap();
    while state.content().target() != "one" {
        match frames.next().await.unwrap().unwrap() {
            StreamFrame::Event(event) => {
                state.apply(event);
            }
            StreamFrame::End(reason) => panic!("stream ended early: {reason:?}"),
        }
    }
    drop(frames);

    // Output produced while nobody is watching.
    first_gate.notify_one();
    for _ in 0..200 {
        if client.get_snapshot(&id).await.unwrap().content() == "one two" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (tx, mut rx) = mpsc::channel(64);
    let reader = {
        let client = client.clone();
        let id = id.clone();
        tokio::spawn(async move { client.follow(&id, tx, CancellationToken::new()).await })
    };
    let Some(Update::Event(first)) = rx.recv().await else {
        panic!("expected a snapshot");
    };
    assert!(matches!(first.event, Event::Init(_)));
    state.apply(first);
    assert_eq!(state.content().target(), "one two");

    second_gate.notify_one();
    while let Some(update) = rx.recv().await {
        if let Update::Event(event) = update {
            state.apply(event);
        }
    }
    reader.await.unwrap().unwrap();
    assert_eq!(state.content().target(), "one two three");
    assert!(state.is_finished());
}

#[tokio::test]
async fn relay_timeout_is_followed_by_a_reattach() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::content("a"),
            Step::Sleep(Duration::from_millis(800)),
            Step::content("b"),
        ]])
        .with_relay_timeout(Duration::from_millis(200))
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    let state = follow_to_end(&harness.alice(), &id).await;
    assert_eq!(state.content().target(), "ab");
    assert_eq!(state.status(), GenerationStatus::Completed);
}

#[tokio::test]
async fn quiet_generation_outlasts_read_timeouts() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![
            Step::content("a"),
            Step::Sleep(Duration::from_millis(3500)),
            Step::content("b"),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    // The sleep spans more read timeouts than `max_retries` would allow.
    let client = harness.client_with(ClientConfig {
        base_url: harness.base_url.clone(),
        token: Some(ALICE_TOKEN.to_string()),
        read_timeout_secs: 1,
        max_retries: 1,
        retry_backoff_ms: 10,
    });
    let state = follow_to_end(&client, &id).await;
    assert_eq!(state.content().target(), "ab");
    assert_eq!(state.status(), GenerationStatus::Completed);
}

#[tokio::test]
async fn slow_viewer_recovers_from_lag() {
    let script: Vec<Step> = (0..64).map(|i| Step::content(&format!("{i},"))).collect();
    let expected: String = (0..64).map(|i| format!("{i},")).collect();
    let harness = TestHarness::builder()
        .with_scripts(vec![script])
        .with_channel_capacity(2)
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;

    let state = follow_to_end(&harness.alice(), &id).await;
    assert_eq!(state.content().target(), expected);
}

// ---- Storage ----

#[tokio::test]
async fn sqlite_backend_serves_the_same_protocol() {
    let harness = TestHarness::builder()
        .with_sqlite()
        .with_scripts(vec![vec![
            Step::tool_start("t1", "search", "web"),
            Step::tool_complete("t1", serde_json::json!({"hits": 3})),
            Step::content("from disk"),
        ]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let id = start(&harness, &conversation, "m1").await;
    let client = harness.alice();

    let state = follow_to_end(&client, &id).await;
    assert_eq!(state.content().target(), "from disk");
    assert_eq!(state.tools().get("t1").unwrap().status, ToolStatus::Completed);

    let record = client.get_snapshot(&id).await.unwrap();
    assert_eq!(record.status(), GenerationStatus::Completed);
    assert_eq!(record.content(), "from disk");

    harness.shutdown().await.unwrap();
}

// ---- Multiple viewers ----

#[tokio::test]
async fn sessions_follow_independent_generations() {
    let harness = TestHarness::builder()
        .with_scripts(vec![vec![Step::content("first")], vec![Step::content("second")]])
        .build()
        .await
        .unwrap();
    let conversation = harness.conversation_for("alice").await.unwrap();
    let m1 = start(&harness, &conversation, "m1").await;
    let m2 = start(&harness, &conversation, "m2").await;

    let mut sessions = SessionMultiplexer::new(harness.alice(), RevealConfig::default());
    let (s1, s2) = (SessionId::from("tab-1"), SessionId::from("tab-2"));
    sessions.attach(s1.clone(), m1);
    sessions.attach(s2.clone(), m2);

    for _ in 0..200 {
        sessions.drain();
        if sessions.sessions().all(|s| !sessions.is_reading(s)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let first = sessions.state(&s1).unwrap();
    let second = sessions.state(&s2).unwrap();
    assert!(first.is_finished() && second.is_finished());
    let mut contents = [first.content().target(), second.content().target()];
    contents.sort();
    assert_eq!(contents, ["first", "second"]);
}
