// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-generation broadcast channels.
//!
//! One topic per message id. The producer publishes sequenced events; each
//! attached viewer holds its own receiver. Closing a topic drops the sender,
//! so receivers drain what is buffered and then observe `Closed`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use reprise_core::{MessageId, SequencedEvent};

/// Topic-keyed multicast hub. Cheap to clone.
#[derive(Clone)]
pub struct EventHub {
    channels: Arc<DashMap<MessageId, broadcast::Sender<SequencedEvent>>>,
    capacity: usize,
}

impl EventHub {
    /// Create a hub whose topics buffer `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish to a topic. Returns the number of receivers reached; `0` when
    /// nobody is attached.
    pub fn publish(&self, message_id: &MessageId, event: SequencedEvent) -> usize {
        match self.channels.get(message_id) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to a topic, creating it if needed.
    pub fn subscribe(&self, message_id: &MessageId) -> broadcast::Receiver<SequencedEvent> {
        self.channels
            .entry(message_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop the topic's sender. Existing receivers drain, then see `Closed`.
    pub fn close(&self, message_id: &MessageId) {
        self.channels.remove(message_id);
    }

    /// Number of receivers currently attached to a topic.
    pub fn subscriber_count(&self, message_id: &MessageId) -> usize {
        self.channels
            .get(message_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Remove topics with no receivers. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
        before.saturating_sub(self.channels.len())
    }

    /// Number of open topics.
    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}
