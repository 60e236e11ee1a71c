// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for gateway attach streams.
//!
//! Converts a reqwest response byte stream into [`StreamFrame`]s using the
//! `eventsource-stream` crate for SSE protocol compliance. The SSE `id` field
//! carries the event sequence number.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

use reprise_core::{EndReason, Event, RepriseError, SequencedEvent};

/// One parsed frame of an attach stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(SequencedEvent),
    /// End-of-stream marker.
    End(EndReason),
}

/// A boxed stream of frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, RepriseError>> + Send>>;

#[derive(Deserialize)]
struct EndPayload {
    reason: EndReason,
}

const EVENT_NAMES: &[&str] = &["init", "status", "chunk", "tool_event", "complete", "error"];

fn protocol_error(message: String, source: Option<serde_json::Error>) -> RepriseError {
    RepriseError::Transport {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

/// Parse one SSE event. Unknown event names yield `None`.
pub fn parse_frame(name: &str, id: &str, data: &str) -> Option<Result<StreamFrame, RepriseError>> {
    if name == "end" {
        return Some(
            serde_json::from_str::<EndPayload>(data)
                .map(|p| StreamFrame::End(p.reason))
                .map_err(|e| protocol_error(format!("failed to parse end marker: {e}"), Some(e))),
        );
    }
    if !EVENT_NAMES.contains(&name) {
        return None;
    }
    let seq = match id.parse::<u64>() {
        Ok(seq) => seq,
        Err(_) => {
            return Some(Err(protocol_error(
                format!("{name} event has invalid id {id:?}"),
                None,
            )));
        }
    };
    Some(
        serde_json::from_str::<Event>(data)
            .map(|event| StreamFrame::Event(SequencedEvent::new(seq, event)))
            .map_err(|e| protocol_error(format!("failed to parse {name} event: {e}"), Some(e))),
    )
}

/// Parse a streaming gateway response into frames.
pub fn parse_sse_stream(response: reqwest::Response) -> FrameStream {
    let events = response.bytes_stream().eventsource();
    let mapped = events.filter_map(|result| async move {
        match result {
            Ok(event) => parse_frame(&event.event, &event.id, &event.data),
            Err(e) => Some(Err(RepriseError::Transport {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });
    Box::pin(mapped)
}
