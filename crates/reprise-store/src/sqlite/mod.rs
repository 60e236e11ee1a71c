// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite backend for records and conversations.
//!
//! Every statement runs on tokio-rusqlite's single background thread, which
//! serialises writers and makes each `mutate` a read-modify-write without
//! interleaving. Do not open a second connection for writes.

mod conversations;
mod migrations;
mod records;

use async_trait::async_trait;
use tracing::debug;

use reprise_config::model::StorageConfig;
use reprise_core::{Adapter, AdapterType, HealthStatus, RepriseError};

pub use migrations::run_migrations;

/// Errors raised inside a connection closure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TxError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The mutation itself refused; returned to the caller unchanged.
    #[error(transparent)]
    Rejected(RepriseError),
}

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RepriseError {
    RepriseError::storage(e)
}

pub(crate) fn map_tx_err(e: tokio_rusqlite::Error<TxError>) -> RepriseError {
    match e {
        tokio_rusqlite::Error::Error(TxError::Rejected(inner)) => inner,
        other => RepriseError::storage(other),
    }
}

/// SQLite-backed [`reprise_core::RecordStore`] and [`reprise_core::ConversationStore`].
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `config.database_path` and
    /// run pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, RepriseError> {
        let path = config.database_path.clone();
        if let Some(parent) = std::path::Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(RepriseError::storage)?;
        }
        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(RepriseError::storage)?;
        let store = Self { conn, path };
        store.prepare(config.wal_mode).await?;
        debug!(path = %store.path, "sqlite store opened");
        Ok(store)
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, RepriseError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(RepriseError::storage)?;
        let store = Self {
            conn,
            path: ":memory:".to_string(),
        };
        store.prepare(false).await?;
        Ok(store)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), RepriseError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let _mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                }
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| run_migrations(conn).map_err(TxError::Rejected))
            .await
            .map_err(map_tx_err)
    }

    pub(crate) fn conn(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}

#[async_trait]
impl Adapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RecordStore
    }

    async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepriseError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "shutdown: WAL checkpoint complete");
        Ok(())
    }
}
