// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for resumable generation streams.
//!
//! Viewers attach to a generation over server-sent events. First views and
//! reconnects share one algorithm: subscribe, snapshot, send `init`, then
//! relay live events past the snapshot cursor. See [`attach`].

pub mod attach;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod recording;
pub mod server;
pub mod sse;

pub use attach::{Frame, RelaySettings, attach};
pub use auth::{AuthConfig, Caller};
pub use error::ApiError;
pub use server::{GatewayState, HealthState, bind, router, serve};
