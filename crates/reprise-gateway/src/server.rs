// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use reprise_core::RepriseError;
use reprise_publisher::GenerationRunner;

use crate::attach::RelaySettings;
use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub runner: GenerationRunner,
    pub relay: RelaySettings,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Build the gateway router.
///
/// - `GET /health`, `GET /metrics` (public)
/// - `POST /v1/conversations`
/// - `POST /v1/generations`
/// - `GET /v1/generations/{message_id}`
/// - `GET /v1/generations/{message_id}/status`
/// - `GET /v1/generations/{message_id}/stream` (SSE)
/// - `POST /v1/generations/{message_id}/stop`
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/conversations", post(handlers::post_conversation))
        .route("/v1/generations", post(handlers::post_generation))
        .route("/v1/generations/{message_id}", get(handlers::get_generation))
        .route(
            "/v1/generations/{message_id}/status",
            get(handlers::get_status),
        )
        .route(
            "/v1/generations/{message_id}/stream",
            get(handlers::get_stream),
        )
        .route(
            "/v1/generations/{message_id}/stop",
            post(handlers::post_stop),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the gateway listener.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, RepriseError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| RepriseError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve until `shutdown` fires, then stop accepting and drain open requests.
///
/// Open SSE relays end when the runner closes their topics during shutdown.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), RepriseError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(?addr, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RepriseError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}
