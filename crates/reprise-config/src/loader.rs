// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/reprise/reprise.toml`
//! 3. `~/.config/reprise/reprise.toml`
//! 4. `./reprise.toml`
//! 5. `REPRISE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RepriseConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/reprise/reprise.toml";
pub(crate) const LOCAL_CONFIG: &str = "reprise.toml";

/// Config sections addressable from the environment.
const SECTIONS: &[&str] = &[
    "server",
    "gateway",
    "generation",
    "storage",
    "client",
    "reveal",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reprise").join(LOCAL_CONFIG))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<RepriseConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RepriseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepriseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RepriseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepriseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full figment before extraction, for callers that inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RepriseConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
///
/// Only the leading section name is split off, so `gateway_relay_timeout_secs`
/// maps to `gateway.relay_timeout_secs`. Keys naming no known section pass
/// through unchanged and are rejected by `deny_unknown_fields`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("REPRISE_").map(|key| map_env_key(key.as_str()).into())
}
