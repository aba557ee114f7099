// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Migration of renamed configuration keys.
//!
//! Older configs spelled the notification keys `push_*`. They are rewritten
//! to their current names before Figment extraction so `deny_unknown_fields`
//! keeps working for everything else.

/// Legacy key → current key, inside `[notify]`.
const NOTIFY_RENAMES: &[(&str, &str)] = &[
    ("push_enabled", "enabled"),
    ("push_bot_token", "bot_token"),
    ("push_chat_id", "chat_id"),
    ("push_on_error", "on_error"),
];

/// Rewrites legacy keys in a parsed TOML document.
///
/// When both spellings are present the current name wins and the legacy
/// key is dropped. Returns `true` when anything changed.
pub fn migrate_legacy_keys(doc: &mut toml::Table) -> bool {
    let Some(toml::Value::Table(notify)) = doc.get_mut("notify") else {
        return false;
    };
    let mut changed = false;
    for (old, new) in NOTIFY_RENAMES {
        if let Some(value) = notify.remove(*old) {
            changed = true;
            if !notify.contains_key(*new) {
                notify.insert((*new).to_string(), value);
            }
        }
    }
    changed
}

/// Applies [`migrate_legacy_keys`] to TOML source text.
///
/// Returns `None` when the text does not parse or needs no migration, so
/// callers can keep using the original file (and its error spans).
pub fn migrate_source(content: &str) -> Option<String> {
    let mut doc: toml::Table = content.parse().ok()?;
    if !migrate_legacy_keys(&mut doc) {
        return None;
    }
    toml::to_string(&doc).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_keys_are_renamed() {
        let mut doc: toml::Table = r#"
[notify]
push_enabled = false
push_bot_token = "1:abc"
push_chat_id = "42"
"#
        .parse()
        .unwrap();
        assert!(migrate_legacy_keys(&mut doc));
        let notify = doc["notify"].as_table().unwrap();
        assert_eq!(notify["enabled"].as_bool(), Some(false));
        assert_eq!(notify["bot_token"].as_str(), Some("1:abc"));
        assert_eq!(notify["chat_id"].as_str(), Some("42"));
        assert!(!notify.contains_key("push_enabled"));
    }

    #[test]
    fn current_name_wins() {
        let mut doc: toml::Table = r#"
[notify]
bot_token = "new"
push_bot_token = "old"
"#
        .parse()
        .unwrap();
        assert!(migrate_legacy_keys(&mut doc));
        assert_eq!(doc["notify"]["bot_token"].as_str(), Some("new"));
        assert!(!doc["notify"].as_table().unwrap().contains_key("push_bot_token"));
    }

    #[test]
    fn untouched_config_is_not_rewritten() {
        assert_eq!(migrate_source("[notify]\nenabled = true\n"), None);
        assert_eq!(migrate_source("[watch]\nchannel = \"@x\"\n"), None);
        assert!(migrate_source("[notify]\npush_on_error = true\n").is_some());
    }
}
