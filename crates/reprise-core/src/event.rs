// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire-level event model.
//!
//! Every event the producer publishes is stamped with the record cursor
//! (`seq`) assigned when it was persisted. An `init` snapshot carries the
//! cursor it summarises, so a viewer can splice the snapshot and the live tail
//! together by dropping live events with `seq <= cursor`.
//!
//! JSON shape (one per transport frame):
//! ```text
//! {"type":"init","content":"","thinking":"","tool_events":[],"status":"pending","cursor":0}
//! {"type":"status","label":"searching"}
//! {"type":"chunk","text":"Hel","thinking":false}
//! {"type":"tool_event","tool_id":"t1","event":{"phase":"start","tool_type":"search","tool_name":"web"}}
//! {"type":"complete","metadata":{"tokens":2}}
//! {"type":"error","message":"engine crashed"}
//! ```

use serde::{Deserialize, Serialize};

use crate::tool::{ToolEventKind, ToolExecution};
use crate::types::{GenerationStatus, Metadata};

/// Full-state catch-up snapshot sent first on every attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSnapshot {
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_label: Option<String>,
    pub content: String,
    pub thinking: String,
    #[serde(default)]
    pub tool_events: Vec<ToolExecution>,
    /// Sequence number of the last event folded into this snapshot.
    pub cursor: u64,
}

/// One generation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Catch-up snapshot.
    Init(InitSnapshot),
    /// Coarse phase label ("routing", "searching", ...).
    Status { label: String },
    /// Text delta for the answer or the reasoning stream.
    Chunk {
        text: String,
        #[serde(default)]
        thinking: bool,
    },
    /// Tool lifecycle delta.
    ToolEvent {
        tool_id: String,
        event: ToolEventKind,
    },
    /// The generation finished successfully.
    Complete {
        #[serde(default)]
        metadata: Metadata,
    },
    /// The generation failed.
    Error { message: String },
}

impl Event {
    /// The `type` tag, used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Init(_) => "init",
            Event::Status { .. } => "status",
            Event::Chunk { .. } => "chunk",
            Event::ToolEvent { .. } => "tool_event",
            Event::Complete { .. } => "complete",
            Event::Error { .. } => "error",
        }
    }

    /// Whether this event ends the generation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete { .. } | Event::Error { .. })
    }
}

/// An event stamped with its position in the generation's total order.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: Event,
}

impl SequencedEvent {
    pub fn new(seq: u64, event: Event) -> Self {
        Self { seq, event }
    }
}

/// Why a gateway stream ended. Sent as the payload of the end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A terminal event was delivered.
    Complete,
    /// The relay deadline elapsed before the generation finished.
    Timeout,
    /// The channel closed without a terminal event reaching the relay.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_wire_shape() {
        let event = Event::Chunk {
            text: "Hel".into(),
            thinking: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "chunk", "text": "Hel", "thinking": false})
        );
    }

    #[test]
    fn chunk_thinking_defaults_to_false() {
        let event: Event = serde_json::from_str(r#"{"type":"chunk","text":"x"}"#).unwrap();
        assert_eq!(
            event,
            Event::Chunk {
                text: "x".into(),
                thinking: false
            }
        );
    }

    #[test]
    fn init_parses_with_nested_tools() {
        let json = r#"{
            "type": "init",
            "status": "streaming",
            "content": "Hel",
            "thinking": "",
            "tool_events": [{
                "tool_id": "t1",
                "tool_type": "search",
                "tool_name": "web",
                "status": "running",
                "start_time": "2026-01-01T00:00:00Z"
            }],
            "cursor": 3
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        let Event::Init(snapshot) = event else {
            panic!("expected init");
        };
        assert_eq!(snapshot.cursor, 3);
        assert_eq!(snapshot.tool_events.len(), 1);
        assert!(snapshot.status_label.is_none());
    }

    #[test]
    fn tool_event_nests_phase_tag() {
        let event = Event::ToolEvent {
            tool_id: "t1".into(),
            event: ToolEventKind::Complete { result: None },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_event");
        assert_eq!(json["event"]["phase"], "complete");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn terminal_classification() {
        assert!(Event::Complete {
            metadata: Metadata::new()
        }
        .is_terminal());
        assert!(Event::Error {
            message: "x".into()
        }
        .is_terminal());
        assert!(!Event::Status {
            label: "routing".into()
        }
        .is_terminal());
    }

    #[test]
    fn end_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EndReason::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
