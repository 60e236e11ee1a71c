// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints that serde attributes cannot express. All
//! failures are collected; validation does not stop at the first one.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{RepriseConfig, StorageBackend};

fn positive(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be greater than zero"),
        });
    }
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &RepriseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.server.log_level.as_str();
    if !["trace", "debug", "info", "warn", "error"].contains(&level) {
        errors.push(ConfigError::Validation {
            message: format!(
                "server.log_level `{level}` must be one of trace, debug, info, warn, error"
            ),
        });
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    positive(&mut errors, "gateway.relay_timeout_secs", config.gateway.relay_timeout_secs);
    positive(&mut errors, "gateway.keepalive_secs", config.gateway.keepalive_secs);
    if config.gateway.channel_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.channel_capacity must be at least 1".to_string(),
        });
    }

    let mut seen_tokens = HashSet::new();
    for (i, entry) in config.gateway.tokens.iter().enumerate() {
        if entry.token.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("gateway.tokens[{i}].token must not be empty"),
            });
        }
        if entry.user.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("gateway.tokens[{i}].user must not be empty"),
            });
        }
        if !seen_tokens.insert(&entry.token) {
            errors.push(ConfigError::Validation {
                message: format!("gateway.tokens[{i}] duplicates an earlier token"),
            });
        }
    }

    positive(&mut errors, "generation.retention_secs", config.generation.retention_secs);
    positive(
        &mut errors,
        "generation.sweep_interval_secs",
        config.generation.sweep_interval_secs,
    );

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty for the sqlite backend".to_string(),
        });
    }

    let base_url = config.client.base_url.as_str();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!("client.base_url `{base_url}` must start with http:// or https://"),
        });
    }
    positive(&mut errors, "client.read_timeout_secs", config.client.read_timeout_secs);

    let reveal = &config.reveal;
    positive(&mut errors, "reveal.tick_interval_ms", reveal.tick_interval_ms);
    if reveal.chars_per_tick == 0 {
        errors.push(ConfigError::Validation {
            message: "reveal.chars_per_tick must be at least 1".to_string(),
        });
    }
    if reveal.catch_up_divisor == 0 {
        errors.push(ConfigError::Validation {
            message: "reveal.catch_up_divisor must be at least 1".to_string(),
        });
    }
    if reveal.max_chars_per_tick < reveal.chars_per_tick {
        errors.push(ConfigError::Validation {
            message: format!(
                "reveal.max_chars_per_tick ({}) must not be below reveal.chars_per_tick ({})",
                reveal.max_chars_per_tick, reveal.chars_per_tick
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
