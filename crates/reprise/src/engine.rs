// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in engine for running the server without a model backend.
//!
//! Replays the prompt back word by word with a short thinking preamble, so
//! every part of the protocol (labels, thinking, content, tool events) can be
//! exercised against a real server.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use reprise_core::{
    Adapter, AdapterType, EngineSink, GenerationEngine, GenerationRequest, HealthStatus,
    Metadata, RepriseError, ToolEventKind,
};

/// Echoes prompts back with a per-word delay.
pub struct LoopbackEngine {
    word_delay: Duration,
}

impl LoopbackEngine {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }

    /// Sleep for one word, returning `false` if cancelled first.
    async fn pace(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.word_delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(60))
    }
}

#[async_trait]
impl Adapter for LoopbackEngine {
    fn name(&self) -> &str {
        "loopback"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Engine
    }

    async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepriseError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationEngine for LoopbackEngine {
    async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn EngineSink,
        cancel: CancellationToken,
    ) -> Result<Metadata, RepriseError> {
        let words: Vec<&str> = request.prompt.split_whitespace().collect();

        sink.status_change("thinking").await?;
        sink.thinking_delta(&format!("Echoing {} words.", words.len()))
            .await?;

        sink.tool_event(
            "echo",
            ToolEventKind::Start {
                tool_type: "builtin".into(),
                tool_name: "echo".into(),
            },
        )
        .await?;
        sink.tool_event("echo", ToolEventKind::Complete { result: None })
            .await?;

        sink.status_change("writing").await?;
        let mut emitted = 0usize;
        for (i, word) in words.iter().enumerate() {
            if !self.pace(&cancel).await {
                break;
            }
            let text = if i == 0 {
                (*word).to_string()
            } else {
                format!(" {word}")
            };
            sink.content_delta(&text).await?;
            emitted += 1;
        }

        let mut metadata = Metadata::new();
        metadata.insert("engine".into(), "loopback".into());
        metadata.insert("words".into(), emitted.into());
        Ok(metadata)
    }
}
