// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the gateway.
//!
//! Each configured token maps to one user. The resolved user is attached to
//! the request as a [`Caller`] extension for ownership checks. With no tokens
//! configured every request is rejected (fail-closed).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use reprise_config::model::ApiToken;
use reprise_core::UserId;

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

/// Token table for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    tokens: Arc<HashMap<String, UserId>>,
}

impl AuthConfig {
    pub fn new(tokens: impl IntoIterator<Item = (String, UserId)>) -> Self {
        Self {
            tokens: Arc::new(tokens.into_iter().collect()),
        }
    }

    /// Build from the `[[gateway.tokens]]` config entries.
    pub fn from_config(tokens: &[ApiToken]) -> Self {
        Self::new(
            tokens
                .iter()
                .map(|t| (t.token.clone(), UserId::from(t.user.as_str()))),
        )
    }

    /// Resolve a bearer token to its user.
    pub fn resolve(&self, token: &str) -> Option<&UserId> {
        self.tokens.get(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

/// Middleware that resolves `Authorization: Bearer <token>` to a [`Caller`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.is_empty() {
        tracing::error!("gateway has no tokens configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth.resolve(token))
        .cloned();

    match user {
        Some(user) => {
            request.extensions_mut().insert(Caller(user));
            Ok(next.run(request).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
