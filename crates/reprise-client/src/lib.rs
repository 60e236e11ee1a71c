// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the Reprise streaming protocol.
//!
//! - [`GenerationClient`]: HTTP wrappers plus a reconnecting follow loop.
//! - [`StreamState`]: pure event dispatch into reveal buffers and a tool table.
//! - [`RevealScheduler`]: tick-driven progressive reveal.
//! - [`SessionMultiplexer`]: one slot per open viewer.

pub mod client;
pub mod consumer;
pub mod reveal;
pub mod session;
pub mod sse;

pub use client::{GenerationClient, StartedGeneration, Update, final_events};
pub use consumer::{Applied, StreamState};
pub use reveal::{RevealBuffer, RevealScheduler};
pub use session::{Reattached, SessionMultiplexer};
pub use sse::{FrameStream, StreamFrame, parse_sse_stream};
