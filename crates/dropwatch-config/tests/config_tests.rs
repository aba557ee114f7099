// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Dropwatch configuration system.

use std::io::Write;
use std::path::Path;

use dropwatch_config::diagnostic::ConfigError;
use dropwatch_config::model::{MonitorMode, SuccessMatch, WatchMode};
use dropwatch_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
};
use dropwatch_core::WaitPolicy;

const FULL: &str = r#"
[daemon]
data_dir = "/tmp/dropwatch-test"
log_level = "debug"

[watch]
channel = "@drops"
monitor = "both"
poll_interval_secs = 2.0
dedup_ttl_secs = 900
launch_button_text = "Open"

[open]
pre_open_delay_ms = "300-900"
only_first_party_links = false

[detect]
checks_per_cycle = 3
success_patterns = ["claimed", "reward"]
success_match = "same_line"

[browser]
headless = true
wait_until = "dom_content_loaded"
storage_state = "capture"
storage_state_path = "/tmp/state.json"

[notify]
bot_token = "1:notify"
chat_id = "42"

[[actors]]
label = "alpha"
bot_token = "1:alpha"
proxy = "10.0.0.1:8080:user:pass"

[[actors]]
label = "beta"
bot_token = "1:beta"
"#;

#[test]
fn full_toml_deserializes() {
    let config = load_config_from_str(FULL).expect("valid TOML should deserialize");
    assert_eq!(config.daemon.log_level, "debug");
    assert_eq!(config.watch.channel, "@drops");
    assert_eq!(config.watch.mode, WatchMode::Live);
    assert_eq!(config.watch.monitor, MonitorMode::LiveAndPoll);
    assert_eq!(config.watch.launch_button_text, "Open");
    assert_eq!(config.open.pre_open_delay_ms, "300-900");
    assert!(!config.open.only_first_party_links);
    assert_eq!(config.detect.checks_per_cycle, 3);
    assert_eq!(config.detect.reload_cycles, 1);
    assert_eq!(config.detect.success_match, SuccessMatch::SameLine);
    assert!(config.browser.headless);
    assert_eq!(config.browser.wait_until, WaitPolicy::DomContentLoaded);
    assert!(config.notify.is_active());
    assert_eq!(config.actors.len(), 2);
    assert_eq!(config.actors[0].proxy.as_deref(), Some("10.0.0.1:8080:user:pass"));
    assert_eq!(config.actors[1].profile_dir, None);
}

#[test]
fn full_toml_validates() {
    let config = load_and_validate_str(FULL).expect("should validate");
    assert_eq!(config.actors[1].label, "beta");
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let toml = r#"
[watch]
channel = "@drops"
pol_interval_secs = 3
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key must fail");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion: Some(s), .. }
                if key == "pol_interval_secs" && s == "poll_interval_secs"
        )
    });
    assert!(found, "expected suggestion, got: {errors:?}");
}

#[test]
fn actor_without_token_reports_missing_key() {
    let toml = r#"
[watch]
channel = "@drops"

[[actors]]
label = "alpha"
"#;
    let errors = load_and_validate_str(toml).expect_err("missing token must fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::MissingKey { key } if key.ends_with("bot_token"))),
        "got: {errors:?}"
    );
}

#[test]
fn bad_enum_value_is_reported() {
    let toml = r#"
[watch]
channel = "@drops"
monitor = "sometimes"
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn legacy_notify_keys_are_migrated() {
    let toml = r#"
[watch]
channel = "@drops"

[notify]
push_enabled = true
push_bot_token = "1:legacy"
push_chat_id = "7"
push_on_error = true

[[actors]]
label = "alpha"
bot_token = "1:alpha"
"#;
    let config = load_and_validate_str(toml).expect("legacy keys should migrate");
    assert_eq!(config.notify.bot_token.as_deref(), Some("1:legacy"));
    assert_eq!(config.notify.chat_id.as_deref(), Some("7"));
    assert!(config.notify.on_error);
}

#[test]
fn legacy_keys_migrate_from_a_file_too() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "[watch]\nchannel = \"@drops\"\n\n[notify]\npush_chat_id = \"99\"\n\n[[actors]]\nlabel = \"a\"\nbot_token = \"1:a\"\n"
    )
    .unwrap();
    let config = load_and_validate_path(file.path()).expect("should load");
    assert_eq!(config.notify.chat_id.as_deref(), Some("99"));
}

#[test]
fn env_overrides_nested_keys() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "dropwatch.toml",
            "[watch]\nchannel = \"@drops\"\npoll_interval_secs = 1.0\n",
        )?;
        jail.set_env("DROPWATCH_WATCH_POLL_INTERVAL_SECS", "2.5");
        jail.set_env("DROPWATCH_DETECT_CHECK_INTERVAL_MS", "750");
        jail.set_env("DROPWATCH_NOTIFY_ON_ERROR", "true");
        let config = load_config_from_path(Path::new("dropwatch.toml"))?;
        assert_eq!(config.watch.poll_interval_secs, 2.5);
        assert_eq!(config.detect.check_interval_ms, 750);
        assert!(config.notify.on_error);
        Ok(())
    });
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = load_config_from_path(Path::new("/nonexistent/dropwatch.toml"))
        .expect("missing file is not an error");
    assert_eq!(config.watch.bus_capacity, 200);
    assert!(config.actors.is_empty());
}

#[test]
fn diagnostics_render_without_panicking() {
    let errors = load_and_validate_str("[detect]\nreload_cylces = 2\n").unwrap_err();
    dropwatch_config::render_errors(&errors);
    let rendered = format!("{}", errors[0]);
    assert!(rendered.contains("reload_cylces"));
}
