// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-viewer session slots.
//!
//! Each open viewer (tab, pane) owns one slot keyed by [`SessionId`]: its
//! [`StreamState`] plus the reader feeding it. Readers run as tasks and push
//! updates into a per-reader channel; [`SessionMultiplexer::drain`] applies
//! them on the caller's schedule. Replacing or dropping a reader drops its
//! channel, so frames from a stale reader can never reach the state.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reprise_config::model::RevealConfig;
use reprise_core::{MessageId, RepriseError, SessionId};

use crate::client::{GenerationClient, Update, final_events};
use crate::consumer::StreamState;
use crate::reveal::RevealScheduler;

const READER_BUFFER: usize = 256;

/// Where a reattach landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reattached {
    /// The generation is still running; a live reader was started.
    Live,
    /// The generation finished; its final state was loaded.
    Finished,
    /// The record was reclaimed; the reply lives in the conversation history.
    Archived,
}

struct Reader {
    cancel: CancellationToken,
    updates: mpsc::Receiver<Update>,
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionSlot {
    state: StreamState,
    reader: Option<Reader>,
}

/// Owns every open viewer's state and reader.
pub struct SessionMultiplexer {
    client: GenerationClient,
    scheduler: RevealScheduler,
    slots: HashMap<SessionId, SessionSlot>,
}

impl SessionMultiplexer {
    pub fn new(client: GenerationClient, reveal: RevealConfig) -> Self {
        Self {
            client,
            scheduler: RevealScheduler::new(reveal),
            slots: HashMap::new(),
        }
    }

    fn spawn_reader(&self, session: &SessionId, message_id: &MessageId) -> Reader {
        let (tx, rx) = mpsc::channel(READER_BUFFER);
        let cancel = CancellationToken::new();
        let client = self.client.clone();
        let message_id = message_id.clone();
        let token = cancel.clone();
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = client.follow(&message_id, tx, token).await {
                debug!(session = %session, message_id = %message_id, error = %e, "reader gave up");
            }
        });
        Reader {
            cancel,
            updates: rx,
        }
    }

    /// Open a viewer on `message_id`, replacing whatever the session showed.
    pub fn attach(&mut self, session: SessionId, message_id: MessageId) {
        let reader = self.spawn_reader(&session, &message_id);
        info!(session = %session, message_id = %message_id, "session attached");
        self.slots.insert(
            session,
            SessionSlot {
                state: StreamState::new(message_id),
                reader: Some(reader),
            },
        );
    }

    /// Stop the session's reader. The generation keeps running and the
    /// displayed state is kept.
    pub fn detach(&mut self, session: &SessionId) -> bool {
        match self.slots.get_mut(session) {
            Some(slot) => slot.reader.take().is_some(),
            None => false,
        }
    }

    /// Bring a session back after a detach or a lost reader.
    ///
    /// Status is checked first: a running generation gets a live reader, a
    /// finished one is loaded from its stored record, and a reclaimed one is
    /// marked archived.
    pub async fn reattach(&mut self, session: &SessionId) -> Result<Reattached, RepriseError> {
        let message_id = match self.slots.get_mut(session) {
            Some(slot) => {
                slot.reader = None;
                slot.state.message_id().clone()
            }
            None => {
                return Err(RepriseError::Internal(format!("unknown session {session}")));
            }
        };

        let outcome = match self.client.get_status(&message_id).await {
            Ok(status) if status.active => Reattached::Live,
            Ok(_) => match self.client.get_snapshot(&message_id).await {
                Ok(record) => {
                    if let Some(slot) = self.slots.get_mut(session) {
                        for event in final_events(&record) {
                            slot.state.apply(event);
                        }
                    }
                    Reattached::Finished
                }
                Err(RepriseError::NotFound { .. }) => Reattached::Archived,
                Err(e) => return Err(e),
            },
            Err(RepriseError::NotFound { .. }) => Reattached::Archived,
            Err(e) => return Err(e),
        };

        let reader = (outcome == Reattached::Live).then(|| self.spawn_reader(session, &message_id));
        if let Some(slot) = self.slots.get_mut(session) {
            if outcome == Reattached::Archived {
                slot.state.mark_archived();
            }
            slot.reader = reader;
        }
        info!(session = %session, message_id = %message_id, ?outcome, "session reattached");
        Ok(outcome)
    }

    /// Drop the session entirely.
    pub fn close(&mut self, session: &SessionId) -> bool {
        self.slots.remove(session).is_some()
    }

    /// Apply every pending update from every reader. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        for (session, slot) in &mut self.slots {
            let Some(reader) = slot.reader.as_mut() else {
                continue;
            };
            let mut finished = false;
            loop {
                match reader.updates.try_recv() {
                    Ok(Update::Event(event)) => {
                        slot.state.apply(event);
                        applied += 1;
                    }
                    Ok(Update::Archived) => {
                        slot.state.mark_archived();
                        applied += 1;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                }
            }
            if finished {
                if !slot.state.is_finished() && !slot.state.is_archived() {
                    debug!(session = %session, "reader ended before the generation finished");
                    slot.state.mark_lost("reader stopped".into());
                }
                slot.reader = None;
            }
        }
        applied
    }

    /// Advance every session's reveal by one tick. Returns how many changed.
    pub fn tick_all(&mut self) -> usize {
        let scheduler = &self.scheduler;
        self.slots
            .values_mut()
            .filter_map(|slot| slot.state.tick(scheduler).then_some(()))
            .count()
    }

    pub fn state(&self, session: &SessionId) -> Option<&StreamState> {
        self.slots.get(session).map(|slot| &slot.state)
    }

    /// Whether the session has a running reader.
    pub fn is_reading(&self, session: &SessionId) -> bool {
        self.slots
            .get(session)
            .is_some_and(|slot| slot.reader.is_some())
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionId> {
        self.slots.keys()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
