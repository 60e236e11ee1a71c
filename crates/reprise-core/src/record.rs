// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The generation record and its transition rules.
//!
//! Fields are private: the only way to change a record is through the
//! transition methods below, each of which validates before mutating so a
//! rejected call has no observable effect. Content, thinking and tool events
//! only ever grow.
//!
//! ```text
//! pending ──first event──▶ streaming ──complete──▶ completed
//!    │                         │
//!    └──────────fail───────────┴──────fail───────▶ error
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepriseError;
use crate::event::{Event, InitSnapshot, SequencedEvent};
use crate::tool::{ToolApply, ToolEventKind, ToolExecution, ToolTable};
use crate::types::{ConversationId, FinalMessage, GenerationStatus, MessageId, Metadata};

/// One in-flight or recently finished assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    message_id: MessageId,
    conversation_id: ConversationId,
    status: GenerationStatus,
    #[serde(default)]
    status_label: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    tool_events: ToolTable,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    stream_ready_at: Option<DateTime<Utc>>,
    seq: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    /// A fresh record in `pending`.
    pub fn new(message_id: MessageId, conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            conversation_id,
            status: GenerationStatus::Pending,
            status_label: None,
            content: String::new(),
            thinking: String::new(),
            tool_events: ToolTable::default(),
            error: None,
            metadata: None,
            stream_ready_at: None,
            seq: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn status_label(&self) -> Option<&str> {
        self.status_label.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn tool_events(&self) -> &[ToolExecution] {
        self.tool_events.as_slice()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn stream_ready_at(&self) -> Option<DateTime<Utc>> {
        self.stream_ready_at
    }

    /// Number of events folded into this record so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reject mutation of a terminal record.
    /// Whether `incoming` may take over this record's message id: only once
    /// this record is terminal, and only within the same conversation.
    pub fn is_replaceable_by(&self, incoming: &GenerationRecord) -> bool {
        self.is_terminal() && self.conversation_id == incoming.conversation_id
    }

    fn ensure_open(&self) -> Result<(), RepriseError> {
        if self.is_terminal() {
            return Err(RepriseError::InvalidTransition {
                message_id: self.message_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Record that one more event has been applied. Returns its sequence number.
    fn advance(&mut self) -> u64 {
        if self.status == GenerationStatus::Pending {
            self.status = GenerationStatus::Streaming;
        }
        self.seq += 1;
        self.updated_at = Utc::now();
        self.seq
    }

    /// Append a text delta to `content` or `thinking`.
    pub fn append_content(&mut self, delta: &str, is_thinking: bool) -> Result<u64, RepriseError> {
        self.ensure_open()?;
        if is_thinking {
            self.thinking.push_str(delta);
        } else {
            self.content.push_str(delta);
        }
        Ok(self.advance())
    }

    /// Replace the coarse phase label.
    pub fn set_status_label(&mut self, label: &str) -> Result<u64, RepriseError> {
        self.ensure_open()?;
        self.status_label = Some(label.to_string());
        Ok(self.advance())
    }

    /// Apply a tool lifecycle event.
    ///
    /// Returns `None` for a duplicate `start` (nothing to publish).
    pub fn upsert_tool_event(
        &mut self,
        tool_id: &str,
        event: &ToolEventKind,
    ) -> Result<Option<u64>, RepriseError> {
        self.ensure_open()?;
        match self.tool_events.apply(tool_id, event, Utc::now())? {
            ToolApply::Duplicate => Ok(None),
            ToolApply::Changed => Ok(Some(self.advance())),
        }
    }

    /// Finish successfully. Returns `None` if the record was already terminal.
    pub fn complete(&mut self, metadata: Metadata) -> Option<u64> {
        if self.is_terminal() {
            return None;
        }
        let seq = self.advance();
        self.status = GenerationStatus::Completed;
        self.metadata = Some(metadata);
        self.finished_at = Some(self.updated_at);
        Some(seq)
    }

    /// Finish with an error. Returns `None` if the record was already terminal.
    pub fn fail(&mut self, error: &str) -> Option<u64> {
        if self.is_terminal() {
            return None;
        }
        let seq = self.advance();
        self.status = GenerationStatus::Error;
        self.error = Some(error.to_string());
        self.finished_at = Some(self.updated_at);
        Some(seq)
    }

    /// Record that a delivery channel is attached. Returns `true` the first time.
    pub fn mark_stream_ready(&mut self) -> bool {
        if self.stream_ready_at.is_some() {
            return false;
        }
        self.stream_ready_at = Some(Utc::now());
        true
    }

    /// The catch-up snapshot sent as `init`.
    ///
    /// For a live record the cursor is `seq`. For a terminal record the cursor
    /// stops just before the terminal event, which [`Self::terminal_event`]
    /// replays under its own sequence number.
    pub fn snapshot(&self) -> InitSnapshot {
        let cursor = if self.is_terminal() {
            self.seq.saturating_sub(1)
        } else {
            self.seq
        };
        InitSnapshot {
            status: self.status,
            status_label: self.status_label.clone(),
            content: self.content.clone(),
            thinking: self.thinking.clone(),
            tool_events: self.tool_events.as_slice().to_vec(),
            cursor,
        }
    }

    /// The terminal event, replayed to viewers that attach after the end.
    pub fn terminal_event(&self) -> Option<SequencedEvent> {
        let event = match self.status {
            GenerationStatus::Completed => Event::Complete {
                metadata: self.metadata.clone().unwrap_or_default(),
            },
            GenerationStatus::Error => Event::Error {
                message: self.error.clone().unwrap_or_default(),
            },
            GenerationStatus::Pending | GenerationStatus::Streaming => return None,
        };
        Some(SequencedEvent::new(self.seq, event))
    }

    /// The durable copy handed to the conversation store after completion.
    pub fn to_final_message(&self) -> FinalMessage {
        FinalMessage {
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
            content: self.content.clone(),
            thinking: self.thinking.clone(),
            tool_executions: self.tool_events.as_slice().to_vec(),
            metadata: self.metadata.clone().unwrap_or_default(),
        }
    }
}
