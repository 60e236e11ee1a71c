// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by every pluggable collaborator.

use async_trait::async_trait;

use crate::error::RepriseError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and lifecycle for a pluggable component.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Human-readable name of this instance ("memory", "sqlite", ...).
    fn name(&self) -> &str;

    /// Semantic version of this implementation.
    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the current status.
    async fn health_check(&self) -> Result<HealthStatus, RepriseError>;

    /// Releases held resources. Called once during shutdown.
    async fn shutdown(&self) -> Result<(), RepriseError>;
}
