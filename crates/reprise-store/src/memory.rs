// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local record and conversation stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use reprise_core::{
    Adapter, AdapterType, ConversationId, ConversationStore, FinalMessage, GenerationRecord,
    HealthStatus, MessageId, Mutation, RecordStore, RepriseError, UserId,
};

/// In-memory [`RecordStore`]. Records do not survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<MessageId, GenerationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Adapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RecordStore
    }

    async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepriseError> {
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: GenerationRecord) -> Result<(), RepriseError> {
        match self.records.entry(record.message_id().clone()) {
            Entry::Occupied(existing) if !existing.get().is_replaceable_by(&record) => {
                Err(RepriseError::AlreadyExists {
                    message_id: record.message_id().clone(),
                })
            }
            Entry::Occupied(mut existing) => {
                existing.insert(record);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn load(&self, message_id: &MessageId) -> Result<Option<GenerationRecord>, RepriseError> {
        Ok(self.records.get(message_id).map(|r| r.value().clone()))
    }

    async fn mutate(
        &self,
        message_id: &MessageId,
        mutation: Mutation,
    ) -> Result<Option<u64>, RepriseError> {
        // Record transitions validate before mutating, so applying in place
        // under the shard lock leaves the record untouched on error.
        let mut record = self
            .records
            .get_mut(message_id)
            .ok_or_else(|| RepriseError::NotFound {
                message_id: message_id.clone(),
            })?;
        mutation(record.value_mut())
    }

    async fn list_unfinished(&self) -> Result<Vec<GenerationRecord>, RepriseError> {
        Ok(self
            .records
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.value().clone())
            .collect())
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepriseError> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !matches!(r.finished_at(), Some(at) if at < cutoff));
        Ok(before.saturating_sub(self.records.len()))
    }
}

/// In-memory [`ConversationStore`] for development and tests.
#[derive(Default)]
pub struct MemoryConversations {
    owners: DashMap<ConversationId, UserId>,
    archived: DashMap<MessageId, FinalMessage>,
}

impl MemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversation with a known id.
    pub fn insert(&self, conversation_id: ConversationId, owner: UserId) {
        self.owners.insert(conversation_id, owner);
    }

    /// The archived copy of a message, if it has been persisted.
    pub fn archived(&self, message_id: &MessageId) -> Option<FinalMessage> {
        self.archived.get(message_id).map(|m| m.value().clone())
    }

    pub fn archived_count(&self) -> usize {
        self.archived.len()
    }
}

#[async_trait]
impl Adapter for MemoryConversations {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ConversationStore
    }

    async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepriseError> {
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversations {
    async fn get_conversation_owner(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<UserId>, RepriseError> {
        Ok(self.owners.get(conversation_id).map(|o| o.value().clone()))
    }

    async fn persist_final_message(&self, message: FinalMessage) -> Result<(), RepriseError> {
        self.archived.insert(message.message_id.clone(), message);
        Ok(())
    }

    async fn create_conversation(&self, owner: &UserId) -> Result<ConversationId, RepriseError> {
        let id = ConversationId(uuid::Uuid::new_v4().to_string());
        self.owners.insert(id.clone(), owner.clone());
        Ok(id)
    }
}
