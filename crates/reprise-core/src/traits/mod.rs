// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Narrow trait seams between the streaming core and its collaborators.
//!
//! Storage backends, the external conversation store and the generation
//! engine all extend the [`Adapter`] base trait and use `#[async_trait]` for
//! dynamic dispatch.

pub mod adapter;
pub mod conversation;
pub mod engine;
pub mod store;

pub use adapter::Adapter;
pub use conversation::ConversationStore;
pub use engine::{EngineSink, GenerationEngine};
pub use store::{Mutation, RecordStore};
