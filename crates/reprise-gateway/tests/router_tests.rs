// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use reprise_core::{
    Adapter, AdapterType, ConversationId, EngineSink, GenerationEngine, GenerationRequest,
    HealthStatus, Metadata, RepriseError, UserId,
};
use reprise_gateway::{AuthConfig, GatewayState, HealthState, RelaySettings, router};
use reprise_publisher::{GenerationRunner, RunnerSettings};
use reprise_store::{EventHub, GenerationStateMachine, MemoryConversations, MemoryStore};

/// Emits each prompt word as a chunk, then optionally holds until cancelled.
struct EchoEngine {
    hold: bool,
}

#[async_trait]
impl Adapter for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Engine
    }
    async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
        Ok(HealthStatus::Healthy)
    }
    async fn shutdown(&self) -> Result<(), RepriseError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationEngine for EchoEngine {
    async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn EngineSink,
        cancel: CancellationToken,
    ) -> Result<Metadata, RepriseError> {
        sink.status_change("writing").await?;
        for (i, word) in request.prompt.split_whitespace().enumerate() {
            let text = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            sink.content_delta(&text).await?;
        }
        if self.hold {
            cancel.cancelled().await;
        }
        let mut metadata = Metadata::new();
        metadata.insert("words".into(), request.prompt.split_whitespace().count().into());
        Ok(metadata)
    }
}

struct Harness {
    app: Router,
    conversations: Arc<MemoryConversations>,
}

fn harness(hold: bool) -> Harness {
    let machine = GenerationStateMachine::new(Arc::new(MemoryStore::new()));
    let conversations = Arc::new(MemoryConversations::new());
    conversations.insert(ConversationId::from("c-alice"), UserId::from("alice"));
    conversations.insert(ConversationId::from("c-bob"), UserId::from("bob"));
    let runner = GenerationRunner::new(
        machine,
        EventHub::default(),
        Arc::new(EchoEngine { hold }),
        conversations.clone(),
        RunnerSettings {
            stream_ready_timeout: Duration::from_millis(200),
            drain_timeout: Duration::from_secs(1),
        },
    );
    let state = GatewayState {
        runner,
        relay: RelaySettings {
            timeout: Duration::from_secs(5),
            ..RelaySettings::default()
        },
        auth: AuthConfig::new([
            ("tok-alice".to_string(), UserId::from("alice")),
            ("tok-bob".to_string(), UserId::from("bob")),
        ]),
        health: HealthState::default(),
    };
    Harness {
        app: router(state),
        conversations,
    }
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn start(app: &Router, token: &str, conversation: &str, id: &str, prompt: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(post(
            "/v1/generations",
            token,
            serde_json::json!({"conversation_id": conversation, "message_id": id, "prompt": prompt}),
        ))
        .await
        .unwrap();
    response.status()
}

async fn wait_inactive(app: &Router, id: &str) -> serde_json::Value {
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(get(&format!("/v1/generations/{id}/status"), "tok-alice"))
            .await
            .unwrap();
        let status = body_json(response).await;
        if status["active"] == false {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("generation {id} never finished");
}

#[tokio::test]
async fn health_is_public() {
    let h = harness(false);
    let response = h
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn metrics_without_recorder_is_not_found() {
    let h = harness(false);
    let response = h
        .app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_requires_a_known_token() {
    let h = harness(false);
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/generations/m1/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .app
        .oneshot(get("/v1/generations/m1/status", "tok-mallory"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stream_relays_a_fresh_generation_to_completion() {
    let h = harness(false);
    assert_eq!(
        start(&h.app, "tok-alice", "c-alice", "m1", "Hello brave world").await,
        StatusCode::ACCEPTED
    );

    let response = h
        .app
        .clone()
        .oneshot(get("/v1/generations/m1/stream", "tok-alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    let text = body_text(response).await;
    assert!(text.contains("event: init"), "{text}");
    assert!(text.contains("event: complete"), "{text}");
    assert!(text.contains("event: end"), "{text}");
    assert!(text.contains(r#"{"reason":"complete"}"#), "{text}");

    let status = wait_inactive(&h.app, "m1").await;
    assert_eq!(status["status"], "completed");
    let id = reprise_core::MessageId::from("m1");
    let mut archived = None;
    for _ in 0..100 {
        archived = h.conversations.archived(&id);
        if archived.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(archived.unwrap().content, "Hello brave world");
}

#[tokio::test]
async fn finished_generation_is_served_post_hoc() {
    let h = harness(false);
    start(&h.app, "tok-alice", "c-alice", "m1", "one two").await;
    wait_inactive(&h.app, "m1").await;

    let response = h
        .app
        .clone()
        .oneshot(get("/v1/generations/m1/stream", "tok-alice"))
        .await
        .unwrap();
    let text = body_text(response).await;
    let init = text
        .lines()
        .find(|l| l.starts_with("data: ") && l.contains(r#""type":"init""#))
        .unwrap();
    assert!(init.contains(r#""content":"one two""#), "{init}");
    assert!(text.contains("event: complete"));

    let response = h
        .app
        .oneshot(get("/v1/generations/m1", "tok-alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["content"], "one two");
    assert_eq!(record["status"], "completed");
}

#[tokio::test]
async fn foreign_generation_looks_missing() {
    let h = harness(true);
    start(&h.app, "tok-alice", "c-alice", "m1", "secret").await;

    let foreign = h
        .app
        .clone()
        .oneshot(get("/v1/generations/m1/stream", "tok-bob"))
        .await
        .unwrap();
    let missing = h
        .app
        .clone()
        .oneshot(get("/v1/generations/nope/stream", "tok-bob"))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(foreign).await, body_text(missing).await);

    let response = h
        .app
        .oneshot(post("/v1/generations/m1/stop", "tok-bob", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn starting_in_a_foreign_conversation_is_rejected() {
    let h = harness(false);
    assert_eq!(
        start(&h.app, "tok-bob", "c-alice", "m1", "hi").await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn finished_id_cannot_be_taken_over_by_another_user() {
    let h = harness(false);
    start(&h.app, "tok-alice", "c-alice", "m1", "one two").await;
    wait_inactive(&h.app, "m1").await;

    let response = h
        .app
        .clone()
        .oneshot(post(
            "/v1/generations",
            "tok-bob",
            serde_json::json!({"conversation_id": "c-bob", "message_id": "m1", "prompt": "mine now"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_text(response).await;
    assert!(!body.contains("c-alice"), "{body}");

    let response = h
        .app
        .clone()
        .oneshot(get("/v1/generations/m1", "tok-alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["content"], "one two");
    assert_eq!(record["conversation_id"], "c-alice");

    let response = h
        .app
        .clone()
        .oneshot(get("/v1/generations/m1", "tok-bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(
        start(&h.app, "tok-alice", "c-alice", "m1", "three").await,
        StatusCode::ACCEPTED
    );
    let status = wait_inactive(&h.app, "m1").await;
    assert_eq!(status["status"], "completed");
}

#[tokio::test]
async fn duplicate_start_conflicts_and_stop_ends_the_run() {
    let h = harness(true);
    assert_eq!(
        start(&h.app, "tok-alice", "c-alice", "m1", "hold on").await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        start(&h.app, "tok-alice", "c-alice", "m1", "again").await,
        StatusCode::CONFLICT
    );

    let response = h
        .app
        .clone()
        .oneshot(post("/v1/generations/m1/stop", "tok-alice", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["stopped"], true);

    let status = wait_inactive(&h.app, "m1").await;
    assert_eq!(status["status"], "completed");

    let response = h
        .app
        .oneshot(get("/v1/generations/m1", "tok-alice"))
        .await
        .unwrap();
    let record = body_json(response).await;
    assert_eq!(record["metadata"]["stopped"], true);
}

#[tokio::test]
async fn create_conversation_then_start() {
    let h = harness(false);
    let response = h
        .app
        .clone()
        .oneshot(post("/v1/conversations", "tok-bob", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let conversation = body_json(response).await["conversation_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = h
        .app
        .clone()
        .oneshot(post(
            "/v1/generations",
            "tok-bob",
            serde_json::json!({"conversation_id": conversation, "prompt": "generated id"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started = body_json(response).await;
    assert!(started["message_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(started["run_id"].as_str().is_some());
}

#[tokio::test]
async fn empty_prompt_is_a_bad_request() {
    let h = harness(false);
    assert_eq!(
        start(&h.app, "tok-alice", "c-alice", "m1", "   ").await,
        StatusCode::BAD_REQUEST
    );
}
