// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reprise serve` command implementation.
//!
//! Wires storage, the state machine, the runner and the gateway together,
//! then serves until SIGINT/SIGTERM. On shutdown the gateway stops accepting
//! attaches first, then active runs are drained.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reprise_config::RepriseConfig;
use reprise_config::model::StorageBackend;
use reprise_core::{ConversationStore, RecordStore, RepriseError};
use reprise_gateway::{AuthConfig, GatewayState, HealthState, RelaySettings};
use reprise_publisher::{GenerationRunner, RunnerSettings};
use reprise_store::{EventHub, GenerationStateMachine, MemoryConversations, MemoryStore, SqliteStore};

use crate::engine::LoopbackEngine;
use crate::shutdown;

/// Run the `reprise serve` command.
pub async fn run_serve(config: RepriseConfig) -> Result<(), RepriseError> {
    init_tracing(&config.server.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "reprise starting");

    let health = HealthState {
        start_time: std::time::Instant::now(),
        prometheus_render: if config.server.metrics_enabled {
            install_metrics()
        } else {
            None
        },
    };

    let (records, conversations) = open_storage(&config).await?;
    let machine = GenerationStateMachine::new(records);
    let hub = EventHub::with_capacity(config.gateway.channel_capacity);

    if config.generation.recover_orphans {
        let recovered = machine.recover_orphans().await?;
        if recovered > 0 {
            warn!(recovered, "failed generations left running by a previous process");
        }
    }

    let cancel = shutdown::install_signal_handler();
    let sweeper = reprise_store::retention::spawn_sweeper(
        machine.clone(),
        hub.clone(),
        Duration::from_secs(config.generation.retention_secs),
        Duration::from_secs(config.generation.sweep_interval_secs),
        cancel.clone(),
    );

    let runner = GenerationRunner::new(
        machine,
        hub,
        Arc::new(LoopbackEngine::default()),
        conversations,
        RunnerSettings {
            stream_ready_timeout: Duration::from_millis(config.generation.stream_ready_timeout_ms),
            ..RunnerSettings::default()
        },
    );

    let auth = AuthConfig::from_config(&config.gateway.tokens);
    if auth.is_empty() {
        warn!("no API tokens configured, every /v1 request will be rejected");
    }

    let state = GatewayState {
        runner: runner.clone(),
        relay: relay_settings(&config),
        auth,
        health,
    };

    let listener = reprise_gateway::bind(&config.gateway.host, config.gateway.port).await?;
    let served = reprise_gateway::serve(listener, state, cancel.clone()).await;

    cancel.cancel();
    runner.shutdown().await;
    if let Err(e) = sweeper.await {
        warn!(error = %e, "retention sweeper task failed");
    }
    info!("reprise stopped");
    served
}

fn relay_settings(config: &RepriseConfig) -> RelaySettings {
    RelaySettings {
        timeout: Duration::from_secs(config.gateway.relay_timeout_secs),
        keepalive: Duration::from_secs(config.gateway.keepalive_secs),
        ..RelaySettings::default()
    }
}

async fn open_storage(
    config: &RepriseConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn ConversationStore>), RepriseError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            let records: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
            let conversations: Arc<dyn ConversationStore> = Arc::new(MemoryConversations::new());
            Ok((records, conversations))
        }
        StorageBackend::Sqlite => {
            info!(path = %config.storage.database_path, "opening sqlite storage");
            let store = Arc::new(SqliteStore::open(&config.storage).await?);
            let records: Arc<dyn RecordStore> = store.clone();
            let conversations: Arc<dyn ConversationStore> = store;
            Ok((records, conversations))
        }
    }
}

/// Install the Prometheus recorder and return its render function.
///
/// Returns `None` if a recorder is already installed.
fn install_metrics() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            reprise_publisher::recording::register_metrics();
            reprise_gateway::recording::register_metrics();
            info!("prometheus metrics enabled at /metrics");
            Some(Arc::new(move || handle.render()))
        }
        Err(e) => {
            warn!(error = %e, "failed to install prometheus recorder, metrics disabled");
            None
        }
    }
}

/// Initialize the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("reprise={log_level},reprise_store={log_level},reprise_publisher={log_level},reprise_gateway={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_settings_follow_config() {
        let mut config = RepriseConfig::default();
        config.gateway.relay_timeout_secs = 42;
        config.gateway.keepalive_secs = 3;
        let relay = relay_settings(&config);
        assert_eq!(relay.timeout, Duration::from_secs(42));
        assert_eq!(relay.keepalive, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn memory_backend_opens_without_disk() {
        let mut config = RepriseConfig::default();
        config.storage.backend = StorageBackend::Memory;
        open_storage(&config).await.unwrap();
    }

    #[tokio::test]
    async fn sqlite_backend_opens_at_configured_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = RepriseConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_path = dir.path().join("r.db").to_string_lossy().into_owned();
        open_storage(&config).await.unwrap();
        assert!(dir.path().join("r.db").exists());
    }
}
