// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool invocation snapshots and their lifecycle transitions.
//!
//! The same [`ToolTable`] backs the server-side record (strict: every
//! rejected transition is an error) and the client-side side-table (lenient:
//! rejected transitions are replays and are dropped).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepriseError;
use crate::types::ToolStatus;

/// One progress entry of a running tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStep {
    pub label: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<serde_json::Value>,
}

/// Snapshot of one tool invocation inside a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_id: String,
    pub tool_type: String,
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(default)]
    pub steps: Vec<ToolStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// A tool lifecycle delta, as carried by `tool_event` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ToolEventKind {
    /// The tool started running.
    Start { tool_type: String, tool_name: String },
    /// The tool reported progress.
    Progress {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<serde_json::Value>,
        /// Incremental tool output appended to `streaming_content`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// The tool finished successfully.
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
    /// The tool failed.
    Error { error: String },
}

impl ToolEventKind {
    /// Short name of the phase, for logs.
    pub fn phase(&self) -> &'static str {
        match self {
            ToolEventKind::Start { .. } => "start",
            ToolEventKind::Progress { .. } => "progress",
            ToolEventKind::Complete { .. } => "complete",
            ToolEventKind::Error { .. } => "error",
        }
    }
}

/// Outcome of applying a tool event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolApply {
    /// The table changed.
    Changed,
    /// The event was a duplicate `start` for a known tool; nothing changed.
    Duplicate,
}

/// Ordered tool side-table keyed by `tool_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolTable {
    tools: Vec<ToolExecution>,
}

impl ToolTable {
    /// Build a table from a snapshot list, keeping the first entry per `tool_id`.
    pub fn from_snapshot(tools: Vec<ToolExecution>) -> Self {
        let mut table = Self::default();
        for tool in tools {
            if table.get(&tool.tool_id).is_none() {
                table.tools.push(tool);
            }
        }
        table
    }

    /// Look up a tool by id.
    pub fn get(&self, tool_id: &str) -> Option<&ToolExecution> {
        self.tools.iter().find(|t| t.tool_id == tool_id)
    }

    /// All tools in start order.
    pub fn as_slice(&self) -> &[ToolExecution] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether any tool is still running.
    pub fn any_running(&self) -> bool {
        self.tools.iter().any(|t| t.status == ToolStatus::Running)
    }

    /// Check whether `kind` can be applied to `tool_id` without mutating.
    pub fn check(&self, tool_id: &str, kind: &ToolEventKind) -> Result<ToolApply, RepriseError> {
        let existing = self.get(tool_id);
        match (kind, existing) {
            (ToolEventKind::Start { .. }, Some(_)) => Ok(ToolApply::Duplicate),
            (ToolEventKind::Start { .. }, None) => Ok(ToolApply::Changed),
            (_, None) => Err(RepriseError::InvalidToolTransition {
                tool_id: tool_id.to_string(),
                reason: format!("{} for unknown tool", kind.phase()),
            }),
            (_, Some(tool)) if tool.status.is_terminal() => {
                Err(RepriseError::InvalidToolTransition {
                    tool_id: tool_id.to_string(),
                    reason: format!("{} after tool already {}", kind.phase(), tool.status),
                })
            }
            (_, Some(_)) => Ok(ToolApply::Changed),
        }
    }

    /// Apply a tool lifecycle event at time `now`.
    ///
    /// Validation happens before any mutation, so a rejected event leaves the
    /// table untouched.
    pub fn apply(
        &mut self,
        tool_id: &str,
        kind: &ToolEventKind,
        now: DateTime<Utc>,
    ) -> Result<ToolApply, RepriseError> {
        if self.check(tool_id, kind)? == ToolApply::Duplicate {
            return Ok(ToolApply::Duplicate);
        }

        if let ToolEventKind::Start {
            tool_type,
            tool_name,
        } = kind
        {
            self.tools.push(ToolExecution {
                tool_id: tool_id.to_string(),
                tool_type: tool_type.clone(),
                tool_name: tool_name.clone(),
                status: ToolStatus::Running,
                steps: Vec::new(),
                streaming_content: None,
                result: None,
                error: None,
                start_time: now,
                end_time: None,
            });
            return Ok(ToolApply::Changed);
        }

        let tool = self
            .tools
            .iter_mut()
            .find(|t| t.tool_id == tool_id)
            .ok_or_else(|| RepriseError::Internal(format!("tool {tool_id} vanished")))?;

        match kind {
            ToolEventKind::Start { .. } => {}
            ToolEventKind::Progress {
                step,
                progress,
                output,
            } => {
                tool.steps.push(ToolStep {
                    label: step.clone(),
                    at: now,
                    progress: progress.clone(),
                });
                if let Some(output) = output {
                    tool.streaming_content
                        .get_or_insert_with(String::new)
                        .push_str(output);
                }
            }
            ToolEventKind::Complete { result } => {
                tool.status = ToolStatus::Completed;
                tool.result = result.clone();
                tool.end_time = Some(now);
            }
            ToolEventKind::Error { error } => {
                tool.status = ToolStatus::Failed;
                tool.error = Some(error.clone());
                tool.end_time = Some(now);
            }
        }
        Ok(ToolApply::Changed)
    }

    /// Consume the table into its ordered list.
    pub fn into_vec(self) -> Vec<ToolExecution> {
        self.tools
    }
}
