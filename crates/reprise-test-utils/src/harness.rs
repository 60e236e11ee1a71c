// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full server stack (state machine, hub,
//! runner and gateway) around a [`ScriptedEngine`], serves it on
//! `127.0.0.1:0`, and hands out [`GenerationClient`]s for two test users.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reprise_client::GenerationClient;
use reprise_config::model::{ClientConfig, StorageBackend, StorageConfig};
use reprise_core::{ConversationId, ConversationStore, RecordStore, RepriseError, UserId};
use reprise_gateway::{AuthConfig, GatewayState, HealthState, RelaySettings};
use reprise_publisher::{GenerationRunner, RunnerSettings};
use reprise_store::{EventHub, GenerationStateMachine, MemoryConversations, MemoryStore, SqliteStore};

use crate::scripted_engine::{ScriptedEngine, Step};

/// Token for the primary test user, `alice`.
pub const ALICE_TOKEN: &str = "alice-token";
/// Token for the secondary test user, `bob`.
pub const BOB_TOKEN: &str = "bob-token";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    scripts: Vec<Vec<Step>>,
    backend: StorageBackend,
    relay_timeout: Duration,
    channel_capacity: usize,
    stream_ready_timeout: Duration,
    read_timeout_secs: u64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
            backend: StorageBackend::Memory,
            relay_timeout: Duration::from_secs(30),
            channel_capacity: 256,
            stream_ready_timeout: Duration::from_millis(500),
            read_timeout_secs: 10,
        }
    }

    /// Scripts played by successive generations.
    pub fn with_scripts(mut self, scripts: Vec<Vec<Step>>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Use a temporary SQLite database instead of the memory store.
    pub fn with_sqlite(mut self) -> Self {
        self.backend = StorageBackend::Sqlite;
        self
    }

    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_stream_ready_timeout(mut self, timeout: Duration) -> Self {
        self.stream_ready_timeout = timeout;
        self
    }

    /// Build the stack and start serving.
    pub async fn build(self) -> Result<TestHarness, RepriseError> {
        let mut temp_dir = None;
        let records: Arc<dyn RecordStore>;
        let conversations: Arc<dyn ConversationStore>;
        match self.backend {
            StorageBackend::Memory => {
                records = Arc::new(MemoryStore::new());
                conversations = Arc::new(MemoryConversations::new());
            }
            StorageBackend::Sqlite => {
                let dir = tempfile::TempDir::new().map_err(RepriseError::storage)?;
                let config = StorageConfig {
                    backend: StorageBackend::Sqlite,
                    database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
                    wal_mode: true,
                };
                let store = Arc::new(SqliteStore::open(&config).await?);
                records = store.clone();
                conversations = store;
                temp_dir = Some(dir);
            }
        }

        let machine = GenerationStateMachine::new(records);
        let hub = EventHub::with_capacity(self.channel_capacity);
        let engine = Arc::new(ScriptedEngine::with_scripts(self.scripts));
        let runner = GenerationRunner::new(
            machine,
            hub,
            engine.clone(),
            conversations.clone(),
            RunnerSettings {
                stream_ready_timeout: self.stream_ready_timeout,
                drain_timeout: Duration::from_secs(2),
            },
        );

        let state = GatewayState {
            runner: runner.clone(),
            relay: RelaySettings {
                timeout: self.relay_timeout,
                keepalive: Duration::from_secs(1),
                buffer: 64,
            },
            auth: AuthConfig::new([
                (ALICE_TOKEN.to_string(), UserId::from("alice")),
                (BOB_TOKEN.to_string(), UserId::from("bob")),
            ]),
            health: HealthState::default(),
        };

        let listener = reprise_gateway::bind("127.0.0.1", 0).await?;
        let addr = listener.local_addr().map_err(|e| RepriseError::Transport {
            message: format!("listener has no local address: {e}"),
            source: Some(Box::new(e)),
        })?;
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(reprise_gateway::serve(listener, state, shutdown.clone()));

        Ok(TestHarness {
            base_url: format!("http://{addr}"),
            runner,
            engine,
            conversations,
            shutdown,
            server,
            read_timeout_secs: self.read_timeout_secs,
            _temp_dir: temp_dir,
        })
    }
}

/// A running server stack.
pub struct TestHarness {
    pub base_url: String,
    pub runner: GenerationRunner,
    pub engine: Arc<ScriptedEngine>,
    pub conversations: Arc<dyn ConversationStore>,
    shutdown: CancellationToken,
    server: JoinHandle<Result<(), RepriseError>>,
    read_timeout_secs: u64,
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Client authenticated with `token`.
    pub fn client(&self, token: &str) -> GenerationClient {
        self.client_with(ClientConfig {
            base_url: self.base_url.clone(),
            token: Some(token.to_string()),
            read_timeout_secs: self.read_timeout_secs,
            max_retries: 3,
            retry_backoff_ms: 10,
        })
    }

    /// Client built from an explicit config.
    pub fn client_with(&self, config: ClientConfig) -> GenerationClient {
        match GenerationClient::from_config(&config) {
            Ok(client) => client,
            Err(e) => panic!("test client config rejected: {e}"),
        }
    }

    pub fn alice(&self) -> GenerationClient {
        self.client(ALICE_TOKEN)
    }

    pub fn bob(&self) -> GenerationClient {
        self.client(BOB_TOKEN)
    }

    /// A conversation owned by `user`.
    pub async fn conversation_for(&self, user: &str) -> Result<ConversationId, RepriseError> {
        self.conversations
            .create_conversation(&UserId::from(user))
            .await
    }

    /// Stop runs, then the server.
    pub async fn shutdown(self) -> Result<(), RepriseError> {
        self.runner.shutdown().await;
        self.shutdown.cancel();
        match self.server.await {
            Ok(result) => result,
            Err(e) => Err(RepriseError::Internal(format!("server task failed: {e}"))),
        }
    }
}
