// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The generation state machine.
//!
//! Every write to a generation record goes through here. Each operation is a
//! single atomic [`RecordStore::mutate`] over one of the record's transition
//! methods, so the producer's events are applied in order and a rejected
//! event leaves the stored record unchanged.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use reprise_core::{
    ConversationId, GenerationRecord, MessageId, Metadata, RecordStore, RepriseError,
    ToolEventKind,
};

/// Owns all transitions of generation records.
#[derive(Clone)]
pub struct GenerationStateMachine {
    store: Arc<dyn RecordStore>,
    ready: Arc<DashMap<MessageId, watch::Sender<bool>>>,
}

fn applied(message_id: &MessageId, seq: Option<u64>) -> Result<u64, RepriseError> {
    seq.ok_or_else(|| {
        RepriseError::Internal(format!("transition on {message_id} produced no event"))
    })
}

impl GenerationStateMachine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            ready: Arc::new(DashMap::new()),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Create a `pending` record.
    ///
    /// Fails with [`RepriseError::AlreadyExists`] while a live record holds
    /// the id, or when the id belongs to another conversation. A terminal
    /// record of the same conversation is replaced.
    pub async fn create(
        &self,
        message_id: &MessageId,
        conversation_id: &ConversationId,
    ) -> Result<GenerationRecord, RepriseError> {
        let record = GenerationRecord::new(message_id.clone(), conversation_id.clone());
        self.store.insert(record.clone()).await?;
        self.ready.remove(message_id);
        debug!(message_id = %message_id, conversation_id = %conversation_id, "generation created");
        Ok(record)
    }

    /// Append a content or thinking delta. Returns the event's sequence number.
    pub async fn append_content(
        &self,
        message_id: &MessageId,
        delta: &str,
        is_thinking: bool,
    ) -> Result<u64, RepriseError> {
        self.store
            .append_content(message_id, delta, is_thinking)
            .await
    }

    /// Persist a coarse phase label. Returns the event's sequence number.
    pub async fn set_status_label(
        &self,
        message_id: &MessageId,
        label: &str,
    ) -> Result<u64, RepriseError> {
        let label = label.to_string();
        let seq = self
            .store
            .mutate(
                message_id,
                Box::new(move |r| r.set_status_label(&label).map(Some)),
            )
            .await?;
        applied(message_id, seq)
    }

    /// Apply a tool lifecycle event. `None` for a duplicate `start`.
    pub async fn upsert_tool_event(
        &self,
        message_id: &MessageId,
        tool_id: &str,
        event: &ToolEventKind,
    ) -> Result<Option<u64>, RepriseError> {
        let tool_id = tool_id.to_string();
        let event = event.clone();
        self.store
            .mutate(
                message_id,
                Box::new(move |r| r.upsert_tool_event(&tool_id, &event)),
            )
            .await
    }

    /// Finish successfully. `None` if the record was already terminal.
    pub async fn complete(
        &self,
        message_id: &MessageId,
        metadata: Metadata,
    ) -> Result<Option<u64>, RepriseError> {
        let seq = self
            .store
            .mutate(message_id, Box::new(move |r| Ok(r.complete(metadata))))
            .await?;
        self.ready.remove(message_id);
        Ok(seq)
    }

    /// Finish with an error. `None` if the record was already terminal.
    pub async fn fail(
        &self,
        message_id: &MessageId,
        error: &str,
    ) -> Result<Option<u64>, RepriseError> {
        let error = error.to_string();
        let seq = self
            .store
            .mutate(message_id, Box::new(move |r| Ok(r.fail(&error))))
            .await?;
        self.ready.remove(message_id);
        Ok(seq)
    }

    /// Load a snapshot of the record.
    pub async fn get(&self, message_id: &MessageId) -> Result<GenerationRecord, RepriseError> {
        self.store
            .load(message_id)
            .await?
            .ok_or_else(|| RepriseError::NotFound {
                message_id: message_id.clone(),
            })
    }

    fn ready_sender(&self, message_id: &MessageId) -> watch::Sender<bool> {
        self.ready
            .entry(message_id.clone())
            .or_insert_with(|| watch::channel(false).0)
            .clone()
    }

    /// Signal that a delivery channel is attached.
    ///
    /// Waiters are woken even if persisting the timestamp fails.
    pub async fn mark_stream_ready(&self, message_id: &MessageId) -> Result<(), RepriseError> {
        self.ready_sender(message_id).send_replace(true);
        self.store
            .mutate(
                message_id,
                Box::new(|r| {
                    r.mark_stream_ready();
                    Ok(None)
                }),
            )
            .await?;
        Ok(())
    }

    /// Wait until a viewer attaches, at most `timeout`.
    ///
    /// Returns `false` on timeout so the producer can proceed without one.
    pub async fn wait_stream_ready(&self, message_id: &MessageId, timeout: Duration) -> bool {
        let mut rx = self.ready_sender(message_id).subscribe();
        if let Ok(record) = self.get(message_id).await
            && record.stream_ready_at().is_some()
        {
            return true;
        }
        match tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) | Err(_) => {
                debug!(message_id = %message_id, ?timeout, "no viewer attached before timeout");
                false
            }
        }
    }

    /// Fail every record a previous process left unfinished.
    pub async fn recover_orphans(&self) -> Result<usize, RepriseError> {
        let orphans = self.store.list_unfinished().await?;
        let mut recovered = 0;
        for record in orphans {
            match self
                .fail(record.message_id(), "generation interrupted: server restarted")
                .await
            {
                Ok(Some(_)) => recovered += 1,
                Ok(None) => {}
                Err(e) => warn!(message_id = %record.message_id(), error = %e, "orphan recovery failed"),
            }
        }
        if recovered > 0 {
            info!(count = recovered, "failed orphaned generations");
        }
        Ok(recovered)
    }

    /// Reclaim records that finished more than `retention` ago.
    pub async fn purge_expired(&self, retention: Duration) -> Result<usize, RepriseError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| RepriseError::Config(format!("retention out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - retention;
        let removed = self.store.purge_finished_before(cutoff).await?;
        // Readiness is also persisted on the record, so idle signals can go.
        self.ready.retain(|_, tx| tx.receiver_count() > 0);
        if removed > 0 {
            debug!(count = removed, "purged expired generations");
        }
        Ok(removed)
    }
}
