// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway API.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use reprise_core::{
    ConversationId, GenerationRecord, GenerationRequest, MessageId, RunId, StatusView,
};

use crate::attach::{self, authorize};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::server::GatewayState;
use crate::sse;

/// Body of `POST /v1/generations`.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub conversation_id: ConversationId,
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub prompt: String,
}

/// Response of `POST /v1/generations`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub message_id: MessageId,
    pub run_id: RunId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: ConversationId,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_generations: usize,
}

/// GET /v1/generations/{message_id}/stream
pub async fn get_stream(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(message_id): Path<MessageId>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(last) = headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
        tracing::debug!(message_id = %message_id, last_event_id = last, "reconnect");
    }
    let frames = attach::attach(&state.runner, &caller, &message_id, &state.relay).await?;
    Ok(sse::into_sse(frames, &state.relay).into_response())
}

/// GET /v1/generations/{message_id}/status
pub async fn get_status(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<StatusView>, ApiError> {
    authorize(&state.runner, &caller, &message_id).await?;
    Ok(Json(state.runner.status(&message_id).await?))
}

/// GET /v1/generations/{message_id}
pub async fn get_generation(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<GenerationRecord>, ApiError> {
    let record = authorize(&state.runner, &caller, &message_id).await?;
    Ok(Json(record))
}

/// POST /v1/generations
pub async fn post_generation(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }
    let owner = state
        .runner
        .conversations()
        .get_conversation_owner(&body.conversation_id)
        .await?;
    if owner.as_ref() != Some(&caller) {
        return Err(ApiError::ConversationNotFound);
    }

    let message_id = body.message_id.unwrap_or_else(MessageId::generate);
    let run_id = state
        .runner
        .start(GenerationRequest {
            message_id: message_id.clone(),
            conversation_id: body.conversation_id,
            prompt: body.prompt,
        })
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse { message_id, run_id }),
    ))
}

/// POST /v1/generations/{message_id}/stop
pub async fn post_stop(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<StopResponse>, ApiError> {
    authorize(&state.runner, &caller, &message_id).await?;
    let stopped = state.runner.stop(&message_id);
    Ok(Json(StopResponse { stopped }))
}

/// POST /v1/conversations
pub async fn post_conversation(
    State(state): State<GatewayState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let conversation_id = state
        .runner
        .conversations()
        .create_conversation(&caller)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse { conversation_id }),
    ))
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        active_generations: state.runner.active_runs(),
    })
}

/// GET /metrics (unauthenticated, Prometheus text format)
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
