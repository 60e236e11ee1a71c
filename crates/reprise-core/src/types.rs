// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers and small shared types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifies one generation (one assistant reply).
    MessageId
);
string_id!(
    /// Identifies a conversation in the external document store.
    ConversationId
);
string_id!(
    /// Identifies an authenticated caller.
    UserId
);
string_id!(
    /// Identifies one client-side viewer (tab). Distinct from [`MessageId`].
    SessionId
);
string_id!(
    /// Identifies one production run of a generation.
    RunId
);

impl MessageId {
    /// Generate a fresh random message id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl RunId {
    /// Generate a fresh random run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Opaque producer metadata attached on completion (token counts, timing, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a generation record. Forward-only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationStatus {
    /// Created, no events yet.
    Pending,
    /// At least one event has been published.
    Streaming,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

impl GenerationStatus {
    /// Whether the status is terminal (`completed` or `error`).
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Error)
    }
}

/// Lifecycle status of one tool invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Failed,
}

impl ToolStatus {
    /// Whether the tool has finished.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ToolStatus::Running)
    }
}

/// Health status reported by adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capability.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// The kind of an adapter, used for logging and health reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum AdapterType {
    /// Generation record storage.
    RecordStore,
    /// External conversation document store.
    ConversationStore,
    /// Generation engine.
    Engine,
}

/// A request to produce one assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Caller-generated id of the reply being produced.
    pub message_id: MessageId,
    /// Conversation the reply belongs to.
    pub conversation_id: ConversationId,
    /// User prompt text.
    pub prompt: String,
}

/// The durable copy of a finished reply handed to the conversation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMessage {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub content: String,
    pub thinking: String,
    pub tool_executions: Vec<crate::tool::ToolExecution>,
    pub metadata: Metadata,
}

/// Cheap status view used by clients to decide whether to reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// Whether the generation is still producing output.
    pub active: bool,
    /// Id of the production run currently attached to the generation, if any.
    pub run_id: Option<RunId>,
    /// Current record status.
    pub status: GenerationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn generation_status_terminality() {
        assert!(!GenerationStatus::Pending.is_terminal());
        assert!(!GenerationStatus::Streaming.is_terminal());
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Error.is_terminal());
    }

    #[test]
    fn generation_status_display_and_parse() {
        for status in [
            GenerationStatus::Pending,
            GenerationStatus::Streaming,
            GenerationStatus::Completed,
            GenerationStatus::Error,
        ] {
            let parsed = GenerationStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(
            serde_json::to_string(&GenerationStatus::Streaming).unwrap(),
            "\"streaming\""
        );
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = MessageId::from("m1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m1\"");
        assert_eq!(id.to_string(), "m1");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
    }
}
