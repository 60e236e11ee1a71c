// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Reprise integration tests.
//!
//! Provides a scripted engine and a harness that runs the real gateway on an
//! ephemeral port, for fast, deterministic tests without external services.
//!
//! # Components
//!
//! - [`ScriptedEngine`] - engine that replays pre-configured step scripts
//! - [`TestHarness`] - full server stack plus clients for each test user

pub mod harness;
pub mod scripted_engine;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use scripted_engine::{ScriptedEngine, Step};
