// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine output to persisted, then published, events.
//!
//! Each callback applies one state-machine operation and, only once that has
//! succeeded, publishes the same event stamped with its sequence number. If
//! the store write fails nothing is published. An invariant violation fails
//! the generation and is returned to the engine so it stops producing.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use reprise_core::{
    EngineSink, Event, MessageId, Metadata, RepriseError, SequencedEvent, ToolEventKind,
};
use reprise_store::{EventHub, GenerationStateMachine};

use crate::recording;

/// Producer-side adapter bound to one generation.
pub struct EventPublisher {
    machine: GenerationStateMachine,
    hub: EventHub,
    message_id: MessageId,
}

impl EventPublisher {
    pub fn new(machine: GenerationStateMachine, hub: EventHub, message_id: MessageId) -> Self {
        Self {
            machine,
            hub,
            message_id,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    fn emit(&self, seq: u64, event: Event) {
        let kind = event.kind();
        let receivers = self.hub.publish(&self.message_id, SequencedEvent::new(seq, event));
        recording::record_event(kind);
        debug!(message_id = %self.message_id, seq, kind, receivers, "event published");
    }

    /// Force the generation into `error` when the engine broke an invariant.
    async fn guard<T>(&self, result: Result<T, RepriseError>) -> Result<T, RepriseError> {
        if let Err(e) = &result
            && e.is_invariant_violation()
        {
            error!(message_id = %self.message_id, error = %e, "invariant violation, failing generation");
            if let Err(fail_err) = self.fail(&e.to_string()).await {
                warn!(message_id = %self.message_id, error = %fail_err, "could not fail generation");
            }
        }
        result
    }

    async fn append(&self, text: &str, thinking: bool) -> Result<(), RepriseError> {
        let result = self
            .machine
            .append_content(&self.message_id, text, thinking)
            .await;
        let seq = self.guard(result).await?;
        self.emit(
            seq,
            Event::Chunk {
                text: text.to_string(),
                thinking,
            },
        );
        Ok(())
    }

    /// Complete the generation and close its topic.
    ///
    /// Returns `false` when the generation was already terminal.
    pub async fn complete(&self, metadata: Metadata) -> Result<bool, RepriseError> {
        let seq = self
            .machine
            .complete(&self.message_id, metadata.clone())
            .await?;
        Ok(self.finish(seq, Event::Complete { metadata }))
    }

    /// Fail the generation and close its topic.
    ///
    /// Returns `false` when the generation was already terminal.
    pub async fn fail(&self, message: &str) -> Result<bool, RepriseError> {
        let seq = self.machine.fail(&self.message_id, message).await?;
        Ok(self.finish(
            seq,
            Event::Error {
                message: message.to_string(),
            },
        ))
    }

    fn finish(&self, seq: Option<u64>, event: Event) -> bool {
        let finished = match seq {
            Some(seq) => {
                self.emit(seq, event);
                true
            }
            None => false,
        };
        self.hub.close(&self.message_id);
        finished
    }
}

#[async_trait]
impl EngineSink for EventPublisher {
    async fn content_delta(&self, text: &str) -> Result<(), RepriseError> {
        self.append(text, false).await
    }

    async fn thinking_delta(&self, text: &str) -> Result<(), RepriseError> {
        self.append(text, true).await
    }

    async fn status_change(&self, label: &str) -> Result<(), RepriseError> {
        let result = self.machine.set_status_label(&self.message_id, label).await;
        let seq = self.guard(result).await?;
        self.emit(
            seq,
            Event::Status {
                label: label.to_string(),
            },
        );
        Ok(())
    }

    async fn tool_event(&self, tool_id: &str, event: ToolEventKind) -> Result<(), RepriseError> {
        let result = self
            .machine
            .upsert_tool_event(&self.message_id, tool_id, &event)
            .await;
        match self.guard(result).await? {
            Some(seq) => self.emit(
                seq,
                Event::ToolEvent {
                    tool_id: tool_id.to_string(),
                    event,
                },
            ),
            None => debug!(message_id = %self.message_id, tool_id, "duplicate tool start ignored"),
        }
        Ok(())
    }
}
