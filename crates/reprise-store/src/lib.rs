// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage and fan-out for in-flight generations.
//!
//! - [`GenerationStateMachine`]: the only path through which records change.
//! - [`MemoryStore`] / [`SqliteStore`]: [`reprise_core::RecordStore`] backends.
//! - [`EventHub`]: per-generation broadcast channels.
//! - [`retention`]: orphan recovery and the sweeper that reclaims old records.

pub mod hub;
pub mod machine;
pub mod memory;
pub mod retention;
pub mod sqlite;

pub use hub::EventHub;
pub use machine::GenerationStateMachine;
pub use memory::{MemoryConversations, MemoryStore};
pub use sqlite::SqliteStore;
