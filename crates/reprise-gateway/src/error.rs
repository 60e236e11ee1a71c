// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP rendering of errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use reprise_core::RepriseError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error returned from a handler.
#[derive(Debug)]
pub enum ApiError {
    Reprise(RepriseError),
    /// The conversation does not exist or belongs to someone else.
    ConversationNotFound,
    BadRequest(String),
}

impl From<RepriseError> for ApiError {
    fn from(e: RepriseError) -> Self {
        ApiError::Reprise(e)
    }
}

impl ApiError {
    /// Status code and public message.
    ///
    /// `Forbidden` renders exactly like `NotFound` so callers cannot probe
    /// for other users' generations.
    pub fn parts(&self) -> (StatusCode, String) {
        match self {
            ApiError::Reprise(e) => match e {
                RepriseError::NotFound { .. } | RepriseError::Forbidden { .. } => {
                    (StatusCode::NOT_FOUND, "generation not found".to_string())
                }
                RepriseError::AlreadyExists { .. }
                | RepriseError::InvalidTransition { .. }
                | RepriseError::InvalidToolTransition { .. } => {
                    (StatusCode::CONFLICT, e.to_string())
                }
                RepriseError::StreamTimeout { .. } => {
                    (StatusCode::GATEWAY_TIMEOUT, e.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                ),
            },
            ApiError::ConversationNotFound => {
                (StatusCode::NOT_FOUND, "conversation not found".to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "request failed");
        }
        (status, Json(ErrorResponse { error })).into_response()
    }
}
