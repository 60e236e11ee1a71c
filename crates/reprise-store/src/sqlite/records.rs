// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RecordStore` over the `generations` table.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};

use reprise_core::{GenerationRecord, MessageId, Mutation, RecordStore, RepriseError};

use super::{SqliteStore, TxError, map_tr_err, map_tx_err};

/// Fixed-width UTC timestamps so that text comparison orders them.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const SELECT_ROW: &str =
    "SELECT record, content, thinking, status, seq, updated_at FROM generations";

const APPEND_CONTENT: &str = "UPDATE generations
     SET content = content || ?1,
         seq = seq + 1,
         status = CASE status WHEN 'pending' THEN 'streaming' ELSE status END,
         updated_at = ?2
     WHERE message_id = ?3 AND status IN ('pending', 'streaming')
     RETURNING seq";

const APPEND_THINKING: &str = "UPDATE generations
     SET thinking = thinking || ?1,
         seq = seq + 1,
         status = CASE status WHEN 'pending' THEN 'streaming' ELSE status END,
         updated_at = ?2
     WHERE message_id = ?3 AND status IN ('pending', 'streaming')
     RETURNING seq";

/// One `generations` row. The text and progress columns override the JSON.
struct StoredRow {
    record: String,
    content: String,
    thinking: String,
    status: String,
    seq: i64,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record: row.get(0)?,
            content: row.get(1)?,
            thinking: row.get(2)?,
            status: row.get(3)?,
            seq: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<GenerationRecord, TxError> {
        let mut value: serde_json::Value = serde_json::from_str(&self.record)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("content".into(), self.content.into());
            fields.insert("thinking".into(), self.thinking.into());
            fields.insert("status".into(), self.status.into());
            fields.insert("seq".into(), self.seq.into());
            fields.insert("updated_at".into(), self.updated_at.into());
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn load_row(
    conn: &rusqlite::Connection,
    message_id: &str,
) -> Result<Option<GenerationRecord>, TxError> {
    let row = conn
        .query_row(
            &format!("{SELECT_ROW} WHERE message_id = ?1"),
            params![message_id],
            StoredRow::from_row,
        )
        .optional()?;
    row.map(StoredRow::into_record).transpose()
}

fn write_row(conn: &rusqlite::Connection, record: &GenerationRecord) -> Result<(), TxError> {
    let mut value = serde_json::to_value(record)?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("content");
        fields.remove("thinking");
    }
    conn.execute(
        "INSERT INTO generations
             (message_id, conversation_id, status, seq, record, content, thinking,
              created_at, updated_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(message_id) DO UPDATE SET
             conversation_id = excluded.conversation_id,
             status = excluded.status,
             seq = excluded.seq,
             record = excluded.record,
             content = excluded.content,
             thinking = excluded.thinking,
             created_at = excluded.created_at,
             updated_at = excluded.updated_at,
             finished_at = excluded.finished_at",
        params![
            record.message_id().as_str(),
            record.conversation_id().as_str(),
            record.status().to_string(),
            record.seq() as i64,
            value.to_string(),
            record.content(),
            record.thinking(),
            timestamp(record.created_at()),
            timestamp(record.updated_at()),
            record.finished_at().map(timestamp),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, record: GenerationRecord) -> Result<(), RepriseError> {
        self.conn()
            .call(move |conn| {
                if let Some(existing) = load_row(conn, record.message_id().as_str())?
                    && !existing.is_replaceable_by(&record)
                {
                    return Err(TxError::Rejected(RepriseError::AlreadyExists {
                        message_id: existing.message_id().clone(),
                    }));
                }
                write_row(conn, &record)
            })
            .await
            .map_err(map_tx_err)
    }

    async fn load(&self, message_id: &MessageId) -> Result<Option<GenerationRecord>, RepriseError> {
        let id = message_id.as_str().to_string();
        self.conn()
            .call(move |conn| load_row(conn, &id))
            .await
            .map_err(map_tx_err)
    }

    async fn mutate(
        &self,
        message_id: &MessageId,
        mutation: Mutation,
    ) -> Result<Option<u64>, RepriseError> {
        let id = message_id.clone();
        self.conn()
            .call(move |conn| {
                let mut record = load_row(conn, id.as_str())?.ok_or_else(|| {
                    TxError::Rejected(RepriseError::NotFound {
                        message_id: id.clone(),
                    })
                })?;
                let applied = mutation(&mut record).map_err(TxError::Rejected)?;
                write_row(conn, &record)?;
                Ok(applied)
            })
            .await
            .map_err(map_tx_err)
    }

    async fn append_content(
        &self,
        message_id: &MessageId,
        delta: &str,
        is_thinking: bool,
    ) -> Result<u64, RepriseError> {
        let id = message_id.clone();
        let delta = delta.to_string();
        let now = timestamp(Utc::now());
        self.conn()
            .call(move |conn| -> Result<u64, TxError> {
                let sql = if is_thinking {
                    APPEND_THINKING
                } else {
                    APPEND_CONTENT
                };
                let seq: Option<i64> = conn
                    .query_row(sql, params![delta, now, id.as_str()], |row| row.get(0))
                    .optional()?;
                if let Some(seq) = seq {
                    return Ok(seq as u64);
                }
                let rejected = match load_row(conn, id.as_str())? {
                    Some(record) => RepriseError::InvalidTransition {
                        message_id: id.clone(),
                        status: record.status(),
                    },
                    None => RepriseError::NotFound {
                        message_id: id.clone(),
                    },
                };
                Err(TxError::Rejected(rejected))
            })
            .await
            .map_err(map_tx_err)
    }

    async fn list_unfinished(&self) -> Result<Vec<GenerationRecord>, RepriseError> {
        self.conn()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_ROW}
                     WHERE status IN ('pending', 'streaming')
                     ORDER BY created_at ASC"
                ))?;
                let rows = stmt.query_map([], StoredRow::from_row)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?.into_record()?);
                }
                Ok::<_, TxError>(records)
            })
            .await
            .map_err(map_tx_err)
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepriseError> {
        let cutoff = timestamp(cutoff);
        self.conn()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM generations
                     WHERE finished_at IS NOT NULL AND finished_at < ?1",
                    params![cutoff],
                )
            })
            .await
            .map_err(map_tr_err)
    }
}
