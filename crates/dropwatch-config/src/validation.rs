// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes:
//! channel references, delay and proxy strings, actor uniqueness and bounds.

use std::collections::HashSet;

use dropwatch_core::ChannelRef;

use crate::diagnostic::ConfigError;
use crate::model::{DropwatchConfig, WatchMode};
use crate::values::{DelaySpec, ProxySpec};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem rather than stopping at the first one.
pub fn validate_config(config: &DropwatchConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    match config.watch.mode {
        WatchMode::Live => {
            if config.watch.channel.trim().is_empty() {
                errors.push(ConfigError::validation(
                    "watch.channel must not be empty in live mode",
                ));
            } else if let Err(e) = ChannelRef::parse(&config.watch.channel) {
                errors.push(ConfigError::validation(format!("watch.channel: {e}")));
            }
        }
        WatchMode::Replay => {
            let link = config.watch.replay_link.as_deref().unwrap_or("").trim();
            if !is_message_link(link) {
                errors.push(ConfigError::validation(format!(
                    "watch.replay_link `{link}` must look like t.me/<name>/<id> or t.me/c/<id>/<msg>"
                )));
            }
        }
    }

    if let Err(e) = DelaySpec::parse(&config.open.pre_open_delay_ms) {
        errors.push(ConfigError::validation(format!("open.pre_open_delay_ms: {e}")));
    }

    if config.detect.checks_per_cycle < 1 {
        errors.push(ConfigError::validation("detect.checks_per_cycle must be at least 1"));
    }
    if config.detect.reload_cycles < 1 {
        errors.push(ConfigError::validation("detect.reload_cycles must be at least 1"));
    }
    if config.watch.bus_capacity < 1 {
        errors.push(ConfigError::validation("watch.bus_capacity must be at least 1"));
    }
    if config.watch.open_queue_depth < 1 {
        errors.push(ConfigError::validation("watch.open_queue_depth must be at least 1"));
    }
    if config.transport.backoff_initial_secs > config.transport.backoff_max_secs {
        errors.push(ConfigError::validation(format!(
            "transport.backoff_initial_secs ({}) must not exceed transport.backoff_max_secs ({})",
            config.transport.backoff_initial_secs, config.transport.backoff_max_secs
        )));
    }

    if config.actors.is_empty() {
        errors.push(ConfigError::validation(
            "at least one [[actors]] entry is required",
        ));
    }

    let mut seen_labels = HashSet::new();
    for (i, actor) in config.actors.iter().enumerate() {
        let label = actor.label.trim();
        if label.is_empty() {
            errors.push(ConfigError::validation(format!(
                "actors[{i}].label must not be empty"
            )));
        } else if !seen_labels.insert(label) {
            errors.push(ConfigError::validation(format!(
                "duplicate actor label `{label}` in [[actors]] array"
            )));
        }
        if let Some(proxy) = &actor.proxy
            && let Err(e) = ProxySpec::parse(proxy)
        {
            errors.push(ConfigError::validation(format!("actors[{i}].proxy: {e}")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Shape check for `t.me/<name>/<id>` and `t.me/c/<internal>/<id>` links.
fn is_message_link(link: &str) -> bool {
    let lower = link.to_ascii_lowercase();
    let Some(pos) = lower.find("t.me/") else {
        return false;
    };
    let segments: Vec<&str> = link[pos + "t.me/".len()..]
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    match segments.as_slice() {
        ["c", internal, msg] => numeric(*internal) && numeric(*msg),
        [name, msg] => {
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && numeric(*msg)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActorConfig;

    fn actor(label: &str) -> ActorConfig {
        ActorConfig {
            label: label.to_string(),
            bot_token: "1:abc".to_string(),
            proxy: None,
            profile_dir: None,
        }
    }

    fn valid_config() -> DropwatchConfig {
        let mut config = DropwatchConfig::default();
        config.watch.channel = "@drops".to_string();
        config.actors = vec![actor("alpha"), actor("beta")];
        config
    }

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn default_config_reports_every_problem() {
        let errors = validate_config(&DropwatchConfig::default()).unwrap_err();
        assert!(has_error(&errors, "watch.channel"));
        assert!(has_error(&errors, "[[actors]]"));
    }

    #[test]
    fn duplicate_and_empty_labels_fail() {
        let mut config = valid_config();
        config.actors.push(actor("alpha"));
        config.actors.push(actor("  "));
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "duplicate actor label `alpha`"));
        assert!(has_error(&errors, "actors[3].label"));
    }

    #[test]
    fn bad_delay_and_proxy_fail() {
        let mut config = valid_config();
        config.open.pre_open_delay_ms = "soon".to_string();
        config.actors[0].proxy = Some("host:notaport".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "open.pre_open_delay_ms"));
        assert!(has_error(&errors, "actors[0].proxy"));
    }

    #[test]
    fn zero_bounds_fail() {
        let mut config = valid_config();
        config.detect.checks_per_cycle = 0;
        config.detect.reload_cycles = 0;
        config.watch.bus_capacity = 0;
        config.watch.open_queue_depth = 0;
        config.transport.backoff_initial_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn replay_mode_needs_a_message_link() {
        let mut config = valid_config();
        config.watch.mode = WatchMode::Replay;
        config.watch.channel.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "watch.replay_link"));

        config.watch.replay_link = Some("https://t.me/c/12345/678".to_string());
        assert!(validate_config(&config).is_ok());
        config.watch.replay_link = Some("t.me/drops/9".to_string());
        assert!(validate_config(&config).is_ok());
        config.watch.replay_link = Some("t.me/drops".to_string());
        assert!(validate_config(&config).is_err());
    }
}
