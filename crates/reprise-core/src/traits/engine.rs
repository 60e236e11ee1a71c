// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The generation engine and the sink it reports into.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RepriseError;
use crate::tool::ToolEventKind;
use crate::traits::adapter::Adapter;
use crate::types::{GenerationRequest, Metadata};

/// Receives engine output as it is produced.
///
/// Every call is persisted before it is fanned out. An `Err` means the
/// generation has been terminated and the engine should stop.
#[async_trait]
pub trait EngineSink: Send + Sync {
    async fn content_delta(&self, text: &str) -> Result<(), RepriseError>;

    async fn thinking_delta(&self, text: &str) -> Result<(), RepriseError>;

    /// Report a coarse phase change ("routing", "searching", ...).
    async fn status_change(&self, label: &str) -> Result<(), RepriseError>;

    async fn tool_event(&self, tool_id: &str, event: ToolEventKind) -> Result<(), RepriseError>;
}

/// Produces one assistant reply.
#[async_trait]
pub trait GenerationEngine: Adapter {
    /// Run the generation to completion, reporting output through `sink`.
    ///
    /// Returns the completion metadata. Implementations should return promptly
    /// once `cancel` fires.
    async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn EngineSink,
        cancel: CancellationToken,
    ) -> Result<Metadata, RepriseError>;
}
