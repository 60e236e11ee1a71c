// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ConversationStore` over the `conversations` and `archived_messages` tables.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use reprise_core::{ConversationId, ConversationStore, FinalMessage, RepriseError, UserId};

use super::records::timestamp;
use super::{SqliteStore, TxError, map_tr_err, map_tx_err};

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_conversation_owner(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<UserId>, RepriseError> {
        let id = conversation_id.as_str().to_string();
        self.conn()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT owner FROM conversations WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map(|owner| owner.map(UserId))
            .map_err(map_tr_err)
    }

    async fn persist_final_message(&self, message: FinalMessage) -> Result<(), RepriseError> {
        let message_id = message.message_id.clone();
        self.conn()
            .call(move |conn| {
                let tools = serde_json::to_string(&message.tool_executions)?;
                let metadata = serde_json::to_string(&message.metadata)?;
                conn.execute(
                    "INSERT OR REPLACE INTO archived_messages
                         (message_id, conversation_id, content, thinking,
                          tool_executions, metadata, archived_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        message.message_id.as_str(),
                        message.conversation_id.as_str(),
                        message.content,
                        message.thinking,
                        tools,
                        metadata,
                        timestamp(Utc::now()),
                    ],
                )?;
                Ok::<_, TxError>(())
            })
            .await
            .map_err(map_tx_err)?;
        debug!(message_id = %message_id, "final message archived");
        Ok(())
    }

    async fn create_conversation(&self, owner: &UserId) -> Result<ConversationId, RepriseError> {
        let id = uuid::Uuid::new_v4().to_string();
        let owner = owner.as_str().to_string();
        let row_id = id.clone();
        self.conn()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO conversations (id, owner, created_at) VALUES (?1, ?2, ?3)",
                    params![row_id, owner, timestamp(Utc::now())],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(ConversationId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprise_core::{MessageId, Metadata};

    #[tokio::test]
    async fn conversation_owner_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let alice = UserId::from("alice");
        let id = store.create_conversation(&alice).await.unwrap();

        assert_eq!(store.get_conversation_owner(&id).await.unwrap(), Some(alice));
        assert_eq!(
            store
                .get_conversation_owner(&ConversationId::from("missing"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn archive_requires_known_conversation() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let message = FinalMessage {
            conversation_id: ConversationId::from("nope"),
            message_id: MessageId::from("m1"),
            content: "Hello".into(),
            thinking: String::new(),
            tool_executions: Vec::new(),
            metadata: Metadata::new(),
        };
        assert!(store.persist_final_message(message).await.is_err());
    }

    #[tokio::test]
    async fn archive_is_idempotent() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let conv = store
            .create_conversation(&UserId::from("alice"))
            .await
            .unwrap();
        let message = FinalMessage {
            conversation_id: conv,
            message_id: MessageId::from("m1"),
            content: "Hello".into(),
            thinking: "hmm".into(),
            tool_executions: Vec::new(),
            metadata: Metadata::new(),
        };
        store.persist_final_message(message.clone()).await.unwrap();
        store.persist_final_message(message).await.unwrap();
    }
}
