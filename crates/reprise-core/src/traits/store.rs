// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable per-generation record storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepriseError;
use crate::record::GenerationRecord;
use crate::traits::adapter::Adapter;
use crate::types::MessageId;

/// A read-modify-write step applied to one record under the store's lock.
///
/// The closure returns the sequence number of the event it applied, or
/// `None` when it was a no-op. When it returns an error the store must not
/// persist any change.
pub type Mutation =
    Box<dyn FnOnce(&mut GenerationRecord) -> Result<Option<u64>, RepriseError> + Send>;

/// Key-value storage for generation records.
///
/// Implementations serialise mutations per message id so that concurrent
/// readers always observe a record that has fully applied some prefix of the
/// producer's events.
#[async_trait]
pub trait RecordStore: Adapter {
    /// Insert `record`, replacing an existing record only if it is terminal
    /// and belongs to the same conversation.
    ///
    /// Returns [`RepriseError::AlreadyExists`] when the id is held by a live
    /// record or by a record of another conversation.
    async fn insert(&self, record: GenerationRecord) -> Result<(), RepriseError>;

    /// Load a snapshot of the record.
    async fn load(&self, message_id: &MessageId) -> Result<Option<GenerationRecord>, RepriseError>;

    /// Apply `mutation` atomically and persist the result.
    ///
    /// Returns [`RepriseError::NotFound`] if the record does not exist.
    async fn mutate(
        &self,
        message_id: &MessageId,
        mutation: Mutation,
    ) -> Result<Option<u64>, RepriseError>;

    /// Append a content or thinking delta and return its sequence number.
    ///
    /// Stores that can extend text in place override this; the default goes
    /// through [`RecordStore::mutate`].
    async fn append_content(
        &self,
        message_id: &MessageId,
        delta: &str,
        is_thinking: bool,
    ) -> Result<u64, RepriseError> {
        let delta = delta.to_string();
        let seq = self
            .mutate(
                message_id,
                Box::new(move |r| r.append_content(&delta, is_thinking).map(Some)),
            )
            .await?;
        seq.ok_or_else(|| {
            RepriseError::Internal(format!("append to {message_id} produced no event"))
        })
    }

    /// Every record that has not reached a terminal status.
    async fn list_unfinished(&self) -> Result<Vec<GenerationRecord>, RepriseError>;

    /// Delete terminal records finished before `cutoff`. Returns the count removed.
    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepriseError>;
}
