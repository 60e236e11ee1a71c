// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session multiplexer tests against a mocked gateway.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reprise_client::{GenerationClient, Reattached, SessionMultiplexer};
use reprise_config::model::{ClientConfig, RevealConfig};
use reprise_core::{ConversationId, GenerationRecord, GenerationStatus, MessageId, Metadata, SessionId};

const FINISHED_STREAM: &str = concat!(
    "id: 2\nevent: init\n",
    "data: {\"type\":\"init\",\"status\":\"completed\",\"content\":\"Hello world\",\"thinking\":\"\",\"tool_events\":[],\"cursor\":2}\n\n",
    "id: 3\nevent: complete\ndata: {\"type\":\"complete\",\"metadata\":{}}\n\n",
    "event: end\ndata: {\"reason\":\"complete\"}\n\n",
);

fn multiplexer(server: &MockServer) -> SessionMultiplexer {
    let client = GenerationClient::from_config(&ClientConfig {
        base_url: server.uri(),
        token: Some("tok".into()),
        read_timeout_secs: 5,
        max_retries: 1,
        retry_backoff_ms: 1,
    })
    .unwrap();
    SessionMultiplexer::new(
        client,
        RevealConfig {
            chars_per_tick: 2,
            ..RevealConfig::default()
        },
    )
}

async fn mount_stream(server: &MockServer, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/generations/{id}/stream")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body.to_string()),
        )
        .mount(server)
        .await;
}

async fn drain_until_finished(mux: &mut SessionMultiplexer, session: &SessionId) {
    for _ in 0..200 {
        mux.drain();
        if mux.state(session).is_some_and(|s| s.is_finished()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {session} never finished");
}

fn finished_record(id: &str) -> GenerationRecord {
    let mut record = GenerationRecord::new(MessageId::from(id), ConversationId::from("c1"));
    record.append_content("Stored ", false).unwrap();
    record.append_content("answer", false).unwrap();
    record.complete(Metadata::new());
    record
}

#[tokio::test]
async fn attach_shows_finished_generation() {
    let server = MockServer::start().await;
    mount_stream(&server, "m1", FINISHED_STREAM).await;

    let mut mux = multiplexer(&server);
    let tab = SessionId::from("tab-1");
    mux.attach(tab.clone(), MessageId::from("m1"));
    drain_until_finished(&mut mux, &tab).await;

    let state = mux.state(&tab).unwrap();
    assert_eq!(state.status(), GenerationStatus::Completed);
    assert_eq!(state.content().displayed(), "Hello world");
    assert_eq!(state.cursor(), Some(3));
}

#[tokio::test]
async fn sessions_are_independent() {
    let server = MockServer::start().await;
    mount_stream(&server, "m1", FINISHED_STREAM).await;
    mount_stream(&server, "m2", FINISHED_STREAM).await;

    let mut mux = multiplexer(&server);
    let a = SessionId::from("a");
    let b = SessionId::from("b");
    mux.attach(a.clone(), MessageId::from("m1"));
    mux.attach(b.clone(), MessageId::from("m2"));
    assert_eq!(mux.len(), 2);

    drain_until_finished(&mut mux, &a).await;
    drain_until_finished(&mut mux, &b).await;
    assert!(mux.close(&a));
    assert!(mux.state(&a).is_none());
    assert!(mux.state(&b).unwrap().is_finished());
}

#[tokio::test]
async fn detach_drops_pending_frames() {
    let server = MockServer::start().await;
    mount_stream(&server, "m1", FINISHED_STREAM).await;

    let mut mux = multiplexer(&server);
    let tab = SessionId::from("tab-1");
    mux.attach(tab.clone(), MessageId::from("m1"));
    assert!(mux.detach(&tab));
    assert!(!mux.is_reading(&tab));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mux.drain(), 0);
    let state = mux.state(&tab).unwrap();
    assert_eq!(state.cursor(), None);
    assert_eq!(state.status(), GenerationStatus::Pending);
}

#[tokio::test]
async fn reattach_loads_final_state_of_finished_generation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/generations/m1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "active": false,
            "run_id": null,
            "status": "completed"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/generations/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finished_record("m1")))
        .mount(&server)
        .await;

    let mut mux = multiplexer(&server);
    let tab = SessionId::from("tab-1");
    mux.attach(tab.clone(), MessageId::from("m1"));
    mux.detach(&tab);

    assert_eq!(mux.reattach(&tab).await.unwrap(), Reattached::Finished);
    assert!(!mux.is_reading(&tab));
    let state = mux.state(&tab).unwrap();
    assert!(state.is_finished());
    assert_eq!(state.content().displayed(), "Stored answer");
}

#[tokio::test]
async fn reattach_marks_reclaimed_generation_archived() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/generations/m1/status"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"error": "generation not found"})),
        )
        .mount(&server)
        .await;

    let mut mux = multiplexer(&server);
    let tab = SessionId::from("tab-1");
    mux.attach(tab.clone(), MessageId::from("m1"));
    mux.detach(&tab);

    assert_eq!(mux.reattach(&tab).await.unwrap(), Reattached::Archived);
    assert!(mux.state(&tab).unwrap().is_archived());
}

#[tokio::test]
async fn reattach_unknown_session_errors() {
    let server = MockServer::start().await;
    let mut mux = multiplexer(&server);
    assert!(mux.reattach(&SessionId::from("ghost")).await.is_err());
}

#[tokio::test]
async fn tick_all_reveals_live_text_progressively() {
    let server = MockServer::start().await;
    let live = concat!(
        "id: 0\nevent: init\n",
        "data: {\"type\":\"init\",\"status\":\"pending\",\"content\":\"\",\"thinking\":\"\",\"tool_events\":[],\"cursor\":0}\n\n",
        "id: 1\nevent: chunk\ndata: {\"type\":\"chunk\",\"text\":\"abcdef\",\"thinking\":false}\n\n",
        "event: end\ndata: {\"reason\":\"complete\"}\n\n",
    );
    mount_stream(&server, "m1", live).await;

    let mut mux = multiplexer(&server);
    let tab = SessionId::from("tab-1");
    mux.attach(tab.clone(), MessageId::from("m1"));

    for _ in 0..200 {
        mux.drain();
        if mux.state(&tab).is_some_and(|s| s.content().target() == "abcdef") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    mux.detach(&tab);
    assert_eq!(mux.state(&tab).unwrap().content().target(), "abcdef");

    assert_eq!(mux.tick_all(), 1);
    assert_eq!(mux.state(&tab).unwrap().content().displayed(), "ab");
    mux.tick_all();
    mux.tick_all();
    assert_eq!(mux.state(&tab).unwrap().content().displayed(), "abcdef");
    assert_eq!(mux.tick_all(), 0);
}
