// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The external conversation document store.

use async_trait::async_trait;

use crate::error::RepriseError;
use crate::traits::adapter::Adapter;
use crate::types::{ConversationId, FinalMessage, UserId};

/// Permanent conversation storage, consumed for ownership checks and archival.
#[async_trait]
pub trait ConversationStore: Adapter {
    /// Owner of `conversation_id`, or `None` if the conversation is unknown.
    async fn get_conversation_owner(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<UserId>, RepriseError>;

    /// Archive a finished reply. Called once per completed generation.
    async fn persist_final_message(&self, message: FinalMessage) -> Result<(), RepriseError>;

    /// Create an empty conversation owned by `owner`.
    async fn create_conversation(&self, owner: &UserId) -> Result<ConversationId, RepriseError>;
}
