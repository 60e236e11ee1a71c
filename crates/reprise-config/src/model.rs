// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelt key fails at
//! startup instead of being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Reprise configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepriseConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Producer-side generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Record storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Settings for the `watch`/`status`/`start` client commands.
    #[serde(default)]
    pub client: ClientConfig,

    /// Progressive-reveal pacing.
    #[serde(default)]
    pub reveal: RevealConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Serve Prometheus metrics on `/metrics`.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// A bearer token and the user it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiToken {
    pub token: String,
    pub user: String,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind the listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer tokens accepted by the gateway. Empty means every protected
    /// route answers 401.
    #[serde(default)]
    pub tokens: Vec<ApiToken>,

    /// Maximum time one SSE relay stays open before ending with `timeout`.
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,

    /// Interval between SSE keep-alive comment lines.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Per-generation broadcast buffer. Subscribers that fall further behind
    /// are re-snapshotted.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tokens: Vec::new(),
            relay_timeout_secs: default_relay_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_relay_timeout_secs() -> u64 {
    300
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    256
}

/// Producer-side generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// How long the producer waits for a viewer before generating anyway.
    #[serde(default = "default_stream_ready_timeout_ms")]
    pub stream_ready_timeout_ms: u64,

    /// How long finished records stay replayable before they are reclaimed.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Interval of the retention sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Fail records left unfinished by a previous process at startup.
    #[serde(default = "default_true")]
    pub recover_orphans: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stream_ready_timeout_ms: default_stream_ready_timeout_ms(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            recover_orphans: true,
        }
    }
}

fn default_stream_ready_timeout_ms() -> u64 {
    2_000
}

fn default_retention_secs() -> u64 {
    3_600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Which record store to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; records do not survive restarts.
    Memory,
    /// SQLite file at `database_path`.
    #[default]
    Sqlite,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("reprise").join("reprise.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("reprise.db"))
        .to_string_lossy()
        .into_owned()
}

/// Client configuration for the CLI commands that talk to a gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the gateway, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent on every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Maximum time without an event on an open stream before the client
    /// re-checks status. Keep-alive comments do not reset it.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Consecutive transport failures tolerated before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between reconnect attempts, doubled per consecutive failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            read_timeout_secs: default_read_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_read_timeout_secs() -> u64 {
    45
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Progressive-reveal pacing, in characters per tick.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RevealConfig {
    /// Interval between scheduler ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Characters revealed per tick when the backlog is small.
    #[serde(default = "default_chars_per_tick")]
    pub chars_per_tick: usize,

    /// Backlog (unrevealed characters) above which the rate speeds up.
    #[serde(default = "default_catch_up_threshold")]
    pub catch_up_threshold: usize,

    /// In catch-up, reveal `backlog / catch_up_divisor` characters per tick.
    #[serde(default = "default_catch_up_divisor")]
    pub catch_up_divisor: usize,

    /// Upper bound on characters revealed per tick.
    #[serde(default = "default_max_chars_per_tick")]
    pub max_chars_per_tick: usize,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            chars_per_tick: default_chars_per_tick(),
            catch_up_threshold: default_catch_up_threshold(),
            catch_up_divisor: default_catch_up_divisor(),
            max_chars_per_tick: default_max_chars_per_tick(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_chars_per_tick() -> usize {
    3
}

fn default_catch_up_threshold() -> usize {
    120
}

fn default_catch_up_divisor() -> usize {
    8
}

fn default_max_chars_per_tick() -> usize {
    64
}
