// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted generation engine for deterministic testing.
//!
//! Each `generate` call pops one script from a FIFO queue and plays its
//! steps into the sink. When the queue is empty a single
//! `"mock response"` chunk is produced.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use reprise_core::{
    Adapter, AdapterType, EngineSink, GenerationEngine, GenerationRequest, HealthStatus,
    Metadata, RepriseError, ToolEventKind,
};

/// One step of a script.
#[derive(Debug, Clone)]
pub enum Step {
    Status(String),
    Content(String),
    Thinking(String),
    Tool(String, ToolEventKind),
    Sleep(Duration),
    /// Block until the gate is notified (or the run is cancelled).
    Pause(Arc<Notify>),
    /// Block until the run is cancelled.
    Hold,
    /// Return an engine error.
    Fail(String),
}

impl Step {
    pub fn content(text: &str) -> Self {
        Step::Content(text.to_string())
    }

    pub fn thinking(text: &str) -> Self {
        Step::Thinking(text.to_string())
    }

    pub fn status(label: &str) -> Self {
        Step::Status(label.to_string())
    }

    pub fn tool_start(tool_id: &str, tool_type: &str, tool_name: &str) -> Self {
        Step::Tool(
            tool_id.to_string(),
            ToolEventKind::Start {
                tool_type: tool_type.to_string(),
                tool_name: tool_name.to_string(),
            },
        )
    }

    pub fn tool_complete(tool_id: &str, result: serde_json::Value) -> Self {
        Step::Tool(
            tool_id.to_string(),
            ToolEventKind::Complete {
                result: Some(result),
            },
        )
    }

    pub fn tool_error(tool_id: &str, error: &str) -> Self {
        Step::Tool(
            tool_id.to_string(),
            ToolEventKind::Error {
                error: error.to_string(),
            },
        )
    }
}

/// An engine that plays pre-configured scripts.
pub struct ScriptedEngine {
    scripts: Arc<Mutex<VecDeque<Vec<Step>>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Create an engine pre-loaded with the given scripts.
    pub fn with_scripts(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::from(scripts))),
        }
    }

    /// Add a script to the end of the queue.
    pub async fn push_script(&self, script: Vec<Step>) {
        self.scripts.lock().await.push_back(script);
    }

    async fn next_script(&self) -> Vec<Step> {
        self.scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| vec![Step::content("mock response")])
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted-engine"
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
impl GenerationEngine for ScriptedEngine {
    async fn generate(
        &self,
        _request: &GenerationRequest,
        sink: &dyn EngineSink,
        cancel: CancellationToken,
    ) -> Result<Metadata, RepriseError> {
        let script = self.next_script().await;
        let mut steps = 0u64;
        for step in script {
            if cancel.is_cancelled() {
                break;
            }
            match step {
                Step::Status(label) => sink.status_change(&label).await?,
                Step::Content(text) => sink.content_delta(&text).await?,
                Step::Thinking(text) => sink.thinking_delta(&text).await?,
                Step::Tool(tool_id, kind) => sink.tool_event(&tool_id, kind).await?,
                Step::Sleep(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Step::Pause(gate) => {
                    tokio::select! {
                        _ = gate.notified() => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Step::Hold => {
                    cancel.cancelled().await;
                    break;
                }
                Step::Fail(message) => return Err(RepriseError::Engine { message }),
            }
            steps += 1;
        }
        let mut metadata = Metadata::new();
        metadata.insert("steps".into(), steps.into());
        Ok(metadata)
    }
}
