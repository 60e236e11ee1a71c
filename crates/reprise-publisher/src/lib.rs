// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer side of the streaming protocol.
//!
//! [`EventPublisher`] turns engine callbacks into state-machine operations
//! and publishes each applied event on the hub, always after it has been
//! persisted. [`GenerationRunner`] owns the lifecycle of production runs:
//! start, stop, status, archival on completion.

pub mod publisher;
pub mod recording;
pub mod runner;

pub use publisher::EventPublisher;
pub use runner::{GenerationRunner, RunnerSettings};
