// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events framing for attached streams.
//!
//! SSE event format:
//! ```text
//! id: 4
//! event: chunk
//! data: {"type":"chunk","text":"lo","thinking":false}
//!
//! event: end
//! data: {"reason":"complete"}
//! ```

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};

use reprise_core::EndReason;

use crate::attach::{Frame, RelaySettings};

/// SSE event name of the end-of-stream marker.
pub const END_EVENT: &str = "end";

/// Render one frame as an SSE event.
pub fn frame_to_event(frame: &Frame) -> Result<Event, axum::Error> {
    match frame {
        Frame::Event(sequenced) => Event::default()
            .id(sequenced.seq.to_string())
            .event(sequenced.event.kind())
            .json_data(&sequenced.event),
        Frame::End(reason) => end_event(*reason),
    }
}

fn end_event(reason: EndReason) -> Result<Event, axum::Error> {
    Event::default()
        .event(END_EVENT)
        .json_data(serde_json::json!({ "reason": reason }))
}

/// Wrap a frame stream as an SSE response with keep-alive comments.
pub fn into_sse<S>(
    frames: S,
    settings: &RelaySettings,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + use<S>>
where
    S: Stream<Item = Frame> + Send + 'static,
{
    let events = frames.map(|frame| frame_to_event(&frame));
    Sse::new(events).keep_alive(KeepAlive::new().interval(settings.keepalive))
}
