// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Captured login state: cookies plus per-origin local storage.
//!
//! The file layout matches the common `storageState` JSON shape so a state
//! captured elsewhere can be reused.

use std::path::Path;

use dropwatch_core::DropwatchError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStateFile {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; negative for session cookies.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn session_expiry() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub name: String,
    pub value: String,
}

impl StorageStateFile {
    pub async fn load(path: &Path) -> Result<Self, DropwatchError> {
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| DropwatchError::browser(format!("bad storage state {}: {e}", path.display())))
    }

    /// Writes the file, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), DropwatchError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DropwatchError::Internal(format!("storage state encode: {e}")))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Replaces cookies with the same (name, domain, path) and the local
    /// storage of `origin`'s origin. Everything else is kept.
    pub fn merge(&mut self, cookies: Vec<StoredCookie>, origin: Option<OriginStorage>) {
        for cookie in cookies {
            self.cookies.retain(|c| {
                !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
            });
            self.cookies.push(cookie);
        }
        if let Some(origin) = origin {
            self.origins.retain(|o| o.origin != origin.origin);
            self.origins.push(origin);
        }
    }

    /// Script run on every new document that restores local storage for
    /// whichever captured origin the page belongs to.
    pub fn local_storage_script(&self) -> Option<String> {
        if self.origins.iter().all(|o| o.local_storage.is_empty()) {
            return None;
        }
        let table: serde_json::Map<String, serde_json::Value> = self
            .origins
            .iter()
            .map(|o| {
                let items = o
                    .local_storage
                    .iter()
                    .map(|i| serde_json::json!([i.name, i.value]))
                    .collect();
                (o.origin.clone(), serde_json::Value::Array(items))
            })
            .collect();
        let table = serde_json::Value::Object(table);
        Some(format!(
            "(() => {{ const s = {table}[window.location.origin]; \
             if (!s) return; \
             try {{ for (const [k, v] of s) {{ window.localStorage.setItem(k, v); }} }} catch (e) {{}} }})();"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> StoredCookie {
        StoredCookie {
            name: name.into(),
            value: value.into(),
            domain: ".example.org".into(),
            path: "/".into(),
            expires: -1.0,
            http_only: true,
            secure: true,
        }
    }

    #[test]
    fn reads_common_storage_state_shape() {
        let raw = r#"{
            "cookies": [{"name": "sid", "value": "1", "domain": "a.org", "path": "/",
                         "expires": 1900000000, "httpOnly": true, "secure": false, "sameSite": "Lax"}],
            "origins": [{"origin": "https://a.org",
                         "localStorage": [{"name": "token", "value": "abc"}]}]
        }"#;
        let state: StorageStateFile = serde_json::from_str(raw).unwrap();
        assert_eq!(state.cookies[0].name, "sid");
        assert!(state.cookies[0].http_only);
        assert_eq!(state.origins[0].local_storage[0].value, "abc");
    }

    #[test]
    fn merge_replaces_matching_cookies_and_origin() {
        let mut state = StorageStateFile {
            cookies: vec![cookie("sid", "old"), cookie("keep", "1")],
            origins: vec![OriginStorage {
                origin: "https://a.org".into(),
                local_storage: vec![],
            }],
        };
        state.merge(
            vec![cookie("sid", "new")],
            Some(OriginStorage {
                origin: "https://a.org".into(),
                local_storage: vec![StorageItem {
                    name: "k".into(),
                    value: "v".into(),
                }],
            }),
        );
        assert_eq!(state.cookies.len(), 2);
        assert!(state.cookies.iter().any(|c| c.name == "sid" && c.value == "new"));
        assert_eq!(state.origins.len(), 1);
        assert_eq!(state.origins[0].local_storage.len(), 1);
    }

    #[test]
    fn script_only_when_local_storage_present() {
        assert!(StorageStateFile::default().local_storage_script().is_none());
        let state = StorageStateFile {
            cookies: vec![],
            origins: vec![OriginStorage {
                origin: "https://a.org".into(),
                local_storage: vec![StorageItem {
                    name: "quote\"key".into(),
                    value: "v".into(),
                }],
            }],
        };
        let script = state.local_storage_script().unwrap();
        assert!(script.contains(r#""https://a.org""#));
        assert!(script.contains(r#"quote\"key"#));
    }

    #[tokio::test]
    async fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("login.json");
        let state = StorageStateFile {
            cookies: vec![cookie("sid", "1")],
            origins: vec![],
        };
        state.save(&path).await.unwrap();
        assert_eq!(StorageStateFile::load(&path).await.unwrap(), state);
    }
}
