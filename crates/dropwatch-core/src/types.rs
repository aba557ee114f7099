// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine and its collaborators.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::DropwatchError;
use crate::status::StatusCode;

/// Unique (channel, message) identifier of a post. Used as a map key everywhere.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PostKey {
    pub chat_id: i64,
    pub msg_id: i64,
}

impl PostKey {
    pub fn new(chat_id: i64, msg_id: i64) -> Self {
        Self { chat_id, msg_id }
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.msg_id)
    }
}

/// A live "new post" notification from a subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostEvent {
    pub chat_id: i64,
    pub msg_id: i64,
}

impl PostEvent {
    pub fn key(&self) -> PostKey {
        PostKey::new(self.chat_id, self.msg_id)
    }
}

/// A structured link entity attached to post text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEntity {
    /// Hidden link behind display text.
    TextUrl(String),
    /// A URL that appears literally in the text.
    Url(String),
}

impl LinkEntity {
    pub fn url(&self) -> &str {
        match self {
            Self::TextUrl(u) | Self::Url(u) => u,
        }
    }
}

/// Where an inline action button points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Url(String),
    /// In-app web view target.
    WebApp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub target: ButtonTarget,
}

impl InlineButton {
    pub fn url(&self) -> &str {
        match &self.target {
            ButtonTarget::Url(u) | ButtonTarget::WebApp(u) => u,
        }
    }
}

/// A fully fetched post.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Post {
    pub key: PostKey,
    pub text: String,
    pub entities: Vec<LinkEntity>,
    pub preview_url: Option<String>,
    pub buttons: Vec<InlineButton>,
}

/// A reference to a watched channel as written by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Public `@name` (stored without the `@`).
    Username(String),
    /// Numeric chat id.
    Id(i64),
    /// Private invite hash from `t.me/+hash` or `t.me/joinchat/hash`.
    Invite(String),
}

impl ChannelRef {
    /// Parses `@name`, a bare name, a numeric id, a public `t.me/name` link
    /// or a private invite link.
    pub fn parse(raw: &str) -> Result<Self, DropwatchError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DropwatchError::Config("empty channel".into()));
        }
        if let Some(hash) = invite_hash(trimmed) {
            return Ok(Self::Invite(hash));
        }
        let stripped = strip_link_prefix(trimmed);
        if let Ok(id) = stripped.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        let name = stripped.trim_start_matches('@').trim_end_matches('/');
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DropwatchError::Config(format!(
                "unrecognised channel reference: {trimmed}"
            )));
        }
        Ok(Self::Username(name.to_string()))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username(name) => write!(f, "@{name}"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Invite(hash) => write!(f, "+{hash}"),
        }
    }
}

fn strip_link_prefix(s: &str) -> &str {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let mut offset = 0;
    for scheme in ["https://", "http://"] {
        if lower.starts_with(scheme) {
            offset = scheme.len();
            break;
        }
    }
    let rest_lower = &lower[offset..];
    for host in ["t.me/", "telegram.me/"] {
        if rest_lower.starts_with(host) {
            offset += host.len();
            break;
        }
    }
    s[offset..].trim()
}

/// Extracts the private invite hash from `+hash`, `joinchat/hash` and
/// their `t.me` link forms.
pub fn invite_hash(channel: &str) -> Option<String> {
    let s = strip_link_prefix(channel);
    if let Some(hash) = s.strip_prefix('+') {
        let hash = hash.trim();
        return (!hash.is_empty()).then(|| hash.to_string());
    }
    let hash = s.strip_prefix("joinchat/")?;
    let valid = !hash.is_empty()
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| hash.to_string())
}

/// A resolved channel handle returned by a messaging source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub chat_id: i64,
    pub title: String,
}

/// Result of a membership check / join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JoinState {
    AlreadyMember,
    Joined,
    Failed,
}

/// Terminal classification of one open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Missed,
    Fail,
    Timeout,
    Skip,
    UserStop,
    Error,
}

impl Outcome {
    /// Row status shown for this outcome.
    pub fn status(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::Success,
            Self::Missed => StatusCode::Missed,
            Self::Fail => StatusCode::Fail,
            Self::Timeout => StatusCode::Timeout,
            Self::Skip => StatusCode::Skip,
            Self::UserStop => StatusCode::Stopped,
            Self::Error => StatusCode::Error,
        }
    }
}

/// An outcome together with its human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub outcome: Outcome,
    pub detail: String,
}

impl Detection {
    pub fn new(outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }
}

/// One row of the per-actor status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowState {
    pub actor: String,
    pub proxy: String,
    pub status: StatusCode,
    pub detail: String,
    pub ticket: String,
    /// Unix milliseconds of the last update.
    pub updated_ms: i64,
}

/// Navigation completion criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Earliest committed render.
    #[default]
    Commit,
    DomContentLoaded,
    Load,
}

/// How a browser session treats login state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageState {
    /// Persistent profile directory.
    #[default]
    Off,
    /// Ephemeral context importing previously captured state.
    Use(PathBuf),
    /// Persistent profile; state is exported once after the first navigation.
    Capture(PathBuf),
}

/// Proxy endpoint handed to the browser surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProxy {
    /// e.g. `http://host:port`
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Parameters for opening one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub profile_dir: PathBuf,
    pub proxy: Option<BrowserProxy>,
    pub headless: bool,
    pub storage_state: StorageState,
    pub executable: Option<PathBuf>,
}
