// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Reprise streaming stack.
//!
//! This crate provides the generation record and its transition rules, the
//! event model shared by server and client, error types, and the trait seams
//! to storage, the conversation store and the generation engine.

pub mod error;
pub mod event;
pub mod record;
pub mod tool;
pub mod traits;
pub mod types;

pub use error::RepriseError;
pub use event::{EndReason, Event, InitSnapshot, SequencedEvent};
pub use record::GenerationRecord;
pub use tool::{ToolApply, ToolEventKind, ToolExecution, ToolStep, ToolTable};
pub use traits::{
    Adapter, ConversationStore, EngineSink, GenerationEngine, Mutation, RecordStore,
};
pub use types::{
    AdapterType, ConversationId, FinalMessage, GenerationRequest, GenerationStatus, HealthStatus,
    MessageId, Metadata, RunId, SessionId, StatusView, ToolStatus, UserId,
};
