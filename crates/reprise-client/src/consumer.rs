// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side reconstruction of one generation.
//!
//! [`StreamState::apply`] is the single dispatch point for every event a
//! viewer receives, whether it arrived live, from a re-snapshot, or from a
//! post-hoc fetch. It is pure and never blocks.

use tracing::debug;

use reprise_core::{
    Event, GenerationStatus, InitSnapshot, MessageId, Metadata, SequencedEvent, ToolApply,
    ToolTable,
};

use crate::reveal::{RevealBuffer, RevealScheduler};

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Already reflected in the state (at or below the cursor).
    Ignored,
    /// State changed.
    Updated,
    /// A terminal event arrived; both buffers are flushed.
    Finished,
}

/// Everything a viewer shows for one generation.
#[derive(Debug, Clone)]
pub struct StreamState {
    message_id: MessageId,
    status: GenerationStatus,
    status_label: Option<String>,
    content: RevealBuffer,
    thinking: RevealBuffer,
    tools: ToolTable,
    cursor: Option<u64>,
    metadata: Option<Metadata>,
    error: Option<String>,
    archived: bool,
    lost: Option<String>,
}

impl StreamState {
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            status: GenerationStatus::Pending,
            status_label: None,
            content: RevealBuffer::new(),
            thinking: RevealBuffer::new(),
            tools: ToolTable::default(),
            cursor: None,
            metadata: None,
            error: None,
            archived: false,
            lost: None,
        }
    }

    /// Apply one sequenced event.
    pub fn apply(&mut self, sequenced: SequencedEvent) -> Applied {
        let SequencedEvent { seq, event } = sequenced;

        if let Event::Init(snapshot) = event {
            self.apply_init(snapshot);
            return Applied::Updated;
        }
        if self.cursor.is_some_and(|cursor| seq <= cursor) {
            return Applied::Ignored;
        }
        self.cursor = Some(seq);

        match event {
            Event::Init(_) => Applied::Ignored,
            Event::Status { label } => {
                self.begin_streaming();
                self.status_label = Some(label);
                Applied::Updated
            }
            Event::Chunk { text, thinking } => {
                self.begin_streaming();
                if thinking {
                    self.thinking.push(&text);
                } else {
                    self.content.push(&text);
                }
                Applied::Updated
            }
            Event::ToolEvent { tool_id, event } => {
                self.begin_streaming();
                match self.tools.apply(&tool_id, &event, chrono::Utc::now()) {
                    Ok(ToolApply::Changed) => Applied::Updated,
                    Ok(ToolApply::Duplicate) => Applied::Ignored,
                    Err(e) => {
                        debug!(message_id = %self.message_id, error = %e, "dropping replayed tool event");
                        Applied::Ignored
                    }
                }
            }
            Event::Complete { metadata } => {
                self.status = GenerationStatus::Completed;
                self.metadata = Some(metadata);
                self.finish()
            }
            Event::Error { message } => {
                self.status = GenerationStatus::Error;
                self.error = Some(message);
                self.finish()
            }
        }
    }

    fn apply_init(&mut self, snapshot: InitSnapshot) {
        self.status = snapshot.status;
        self.status_label = snapshot.status_label;
        self.content.replace(snapshot.content);
        self.thinking.replace(snapshot.thinking);
        self.tools = ToolTable::from_snapshot(snapshot.tool_events);
        self.cursor = Some(snapshot.cursor);
    }

    fn begin_streaming(&mut self) {
        if self.status == GenerationStatus::Pending {
            self.status = GenerationStatus::Streaming;
        }
    }

    fn finish(&mut self) -> Applied {
        self.thinking.flush();
        self.content.flush();
        Applied::Finished
    }

    /// Whether content may start revealing: thinking fully shown and no tool running.
    pub fn content_gate_open(&self) -> bool {
        self.thinking.is_caught_up() && !self.tools.any_running()
    }

    /// Advance both buffers by one tick. Returns whether anything was revealed.
    pub fn tick(&mut self, scheduler: &RevealScheduler) -> bool {
        let thinking = scheduler.tick(&mut self.thinking);
        let content = self.content_gate_open() && scheduler.tick(&mut self.content);
        thinking || content
    }

    /// The generation was reclaimed and its reply lives in the conversation history.
    pub fn mark_archived(&mut self) {
        self.archived = true;
    }

    /// The reader gave up.
    pub fn mark_lost(&mut self, reason: String) {
        self.lost = Some(reason);
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn status_label(&self) -> Option<&str> {
        self.status_label.as_deref()
    }

    pub fn content(&self) -> &RevealBuffer {
        &self.content
    }

    pub fn thinking(&self) -> &RevealBuffer {
        &self.thinking
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn lost(&self) -> Option<&str> {
        self.lost.as_deref()
    }
}
