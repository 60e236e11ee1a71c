// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Reprise streaming stack.

use thiserror::Error;

use crate::types::{GenerationStatus, MessageId};

/// The primary error type used across all Reprise crates.
#[derive(Debug, Error)]
pub enum RepriseError {
    /// No generation record exists for the requested message id.
    #[error("generation not found: {message_id}")]
    NotFound { message_id: MessageId },

    /// The caller does not own the conversation the generation belongs to.
    ///
    /// Rendered to HTTP callers exactly like [`RepriseError::NotFound`].
    #[error("access to generation {message_id} denied")]
    Forbidden { message_id: MessageId },

    /// `create` was called for an id whose record is still live.
    #[error("generation already exists: {message_id}")]
    AlreadyExists { message_id: MessageId },

    /// A mutation was attempted on a record in a state that does not allow it.
    #[error("invalid transition for {message_id}: generation is {status}")]
    InvalidTransition {
        message_id: MessageId,
        status: GenerationStatus,
    },

    /// A tool lifecycle event does not fit the tool's current state.
    #[error("invalid tool transition for {tool_id}: {reason}")]
    InvalidToolTransition { tool_id: String, reason: String },

    /// A relay or read exceeded its time budget. Recoverable by re-attaching.
    #[error("stream timed out after {duration:?}")]
    StreamTimeout { duration: std::time::Duration },

    /// Failure reported by the generation engine.
    #[error("engine error: {message}")]
    Engine { message: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// HTTP transport errors on the client side.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepriseError {
    /// Whether this error is a state-machine invariant violation.
    ///
    /// These are never retried; the publisher forces the generation into the
    /// `error` state when it sees one.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            RepriseError::InvalidTransition { .. } | RepriseError::InvalidToolTransition { .. }
        )
    }

    /// Whether a client may recover from this error by re-attaching.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RepriseError::StreamTimeout { .. } | RepriseError::Transport { .. }
        )
    }

    /// Wrap any error as a storage error.
    pub fn storage<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepriseError::Storage {
            source: Box::new(e),
        }
    }
}
