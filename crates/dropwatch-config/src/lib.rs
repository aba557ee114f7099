// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Dropwatch engine.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, migration of legacy
//! key names, and diagnostic error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use dropwatch_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("watching {}", config.watch.channel);
//! ```

pub mod diagnostic;
pub mod legacy;
pub mod loader;
pub mod model;
pub mod validation;
pub mod values;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use legacy::migrate_legacy_keys;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    ActorConfig, DropwatchConfig, MonitorMode, StorageStateMode, SuccessMatch, WatchMode,
};
pub use validation::validate_config;
pub use values::{DelaySpec, ProxySpec};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment errors are converted into diagnostics with typo suggestions;
/// a successfully extracted config then goes through [`validate_config`].
pub fn load_and_validate() -> Result<DropwatchConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => validate_config(&config).map(|()| config),
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<DropwatchConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => validate_config(&config).map(|()| config),
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<DropwatchConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => validate_config(&config).map(|()| config),
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG.into());
    [
        local,
        loader::user_config_path(),
        Path::new(loader::SYSTEM_CONFIG).to_path_buf(),
    ]
    .into_iter()
    .filter_map(|path| {
        std::fs::read_to_string(&path)
            .ok()
            .map(|content| (path.display().to_string(), content))
    })
    .collect()
}
