// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./dropwatch.toml` > `~/.config/dropwatch/dropwatch.toml` >
//! `/etc/dropwatch/dropwatch.toml` with environment variable overrides via `DROPWATCH_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Data, Env, Format, Serialized, Toml},
};

use crate::legacy::migrate_source;
use crate::model::DropwatchConfig;

pub(crate) const LOCAL_CONFIG: &str = "dropwatch.toml";
pub(crate) const SYSTEM_CONFIG: &str = "/etc/dropwatch/dropwatch.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("dropwatch/dropwatch.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dropwatch/dropwatch.toml` (system-wide)
/// 3. `~/.config/dropwatch/dropwatch.toml` (user XDG config)
/// 4. `./dropwatch.toml` (local directory)
/// 5. `DROPWATCH_*` environment variables
pub fn load_config() -> Result<DropwatchConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DropwatchConfig, figment::Error> {
    let migrated = migrate_source(toml_content);
    Figment::new()
        .merge(Serialized::defaults(DropwatchConfig::default()))
        .merge(Toml::string(migrated.as_deref().unwrap_or(toml_content)))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DropwatchConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DropwatchConfig::default()))
        .merge(toml_file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DropwatchConfig::default()))
        .merge(toml_file(Path::new(SYSTEM_CONFIG)))
        .merge(toml_file(&user_config_path()))
        .merge(toml_file(Path::new(LOCAL_CONFIG)))
        .merge(env_provider())
}

/// A TOML file provider, rewritten in memory when it still uses legacy keys.
fn toml_file(path: &Path) -> Data<Toml> {
    let migrated = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| migrate_source(&content));
    match migrated {
        Some(content) => {
            tracing::warn!(
                path = %path.display(),
                "config uses legacy push_* notification keys; rename them under [notify]"
            );
            Toml::string(&content)
        }
        None => Toml::file(path),
    }
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `DROPWATCH_WATCH_POLL_INTERVAL_SECS` must map to
/// `watch.poll_interval_secs`, not `watch.poll.interval.secs`.
fn env_provider() -> Env {
    Env::prefixed("DROPWATCH_").map(|key| {
        let key_str = key.as_str();
        let mapped = [
            "daemon", "watch", "open", "detect", "browser", "transport", "notify",
        ]
        .iter()
        .find_map(|section| {
            key_str
                .strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}
