// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed status-code table shown per actor row.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Status code of one actor row.
///
/// External spellings (legacy log files, old config values) go through
/// [`StatusCode::normalize`]; internal call sites always use the variants.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Waiting,
    Monitoring,
    Poll,
    #[strum(serialize = "NEWMSG")]
    #[serde(rename = "NEWMSG")]
    NewMessage,
    Post,
    NoLink,
    Delay,
    Opening,
    Success,
    Missed,
    Fail,
    Timeout,
    Skip,
    #[strum(serialize = "BADLINK")]
    #[serde(rename = "BADLINK")]
    BadLink,
    ProxyTgr,
    ProxyWebr,
    Error,
    Stopped,
    Login,
    Paused,
    #[strum(serialize = "NOACCESS")]
    #[serde(rename = "NOACCESS")]
    NoAccess,
    Joining,
    Joined,
    #[strum(serialize = "JOINFAIL")]
    #[serde(rename = "JOINFAIL")]
    JoinFail,
}

const ALIASES: &[(&str, StatusCode)] = &[
    ("WAIT", StatusCode::Waiting),
    ("WAITRESULT", StatusCode::Waiting),
    ("IDLE", StatusCode::Waiting),
    ("POLLING", StatusCode::Poll),
    ("PING", StatusCode::Poll),
    ("MIST", StatusCode::Missed),
    ("STOP", StatusCode::Stopped),
    ("PAUSE", StatusCode::Paused),
    ("BLOCKED", StatusCode::BadLink),
    ("BLOCK", StatusCode::BadLink),
    ("NO_ACCESS", StatusCode::NoAccess),
    ("NOTMEMBER", StatusCode::NoAccess),
    ("NEW_MESSAGE", StatusCode::NewMessage),
    ("NEWMSG_EVENT", StatusCode::NewMessage),
    ("JOIN_FAILED", StatusCode::JoinFail),
];

impl StatusCode {
    /// Parses an external status spelling, resolving legacy aliases.
    pub fn normalize(code: &str) -> Option<Self> {
        let upper = code.trim().to_uppercase();
        if let Some((_, status)) = ALIASES.iter().find(|(alias, _)| *alias == upper) {
            return Some(*status);
        }
        Self::from_str(&upper).ok()
    }

    /// Display label for presenters. Some codes embed the row detail.
    pub fn label(self, detail: &str) -> String {
        let d = detail.trim();
        let with_detail = |base: &str| {
            if d.is_empty() {
                base.to_string()
            } else {
                format!("{base} {d}")
            }
        };
        match self {
            Self::Waiting => "⏳ WAITING…".into(),
            Self::Monitoring => "👀 MONITORING".into(),
            Self::Poll => "📡 POLL".into(),
            Self::NewMessage => "📩 NEW MSG".into(),
            Self::Post => "📨 POST".into(),
            Self::NoLink => "🚫 NO LINK".into(),
            Self::Delay => with_detail("⏳ DELAY"),
            Self::Opening => "🔗 OPENING".into(),
            Self::Success => "✅ SUCCESS".into(),
            Self::Missed => "⏱ MISSED".into(),
            Self::Fail => "✖ FAIL".into(),
            Self::Timeout => "⚠️ TIMEOUT".into(),
            Self::Skip => "⚠️ SKIP".into(),
            Self::BadLink => "⛔ BLOCKED LINK".into(),
            Self::ProxyTgr => with_detail("🧱 PROXY TGR"),
            Self::ProxyWebr => with_detail("🧱 PROXY WEBR"),
            Self::Error => "❌ ERROR".into(),
            Self::Stopped => "⏹ STOPPED".into(),
            Self::Login => "🔑 LOGIN".into(),
            Self::Paused => "⏸ PAUSED".into(),
            Self::NoAccess => "🙈 NOT IN CHANNEL".into(),
            Self::Joining => "➕ JOINING".into(),
            Self::Joined => "✅ JOINED".into(),
            Self::JoinFail => "⚠️ JOIN FAILED".into(),
        }
    }

    /// Whether the status is a terminal per-item outcome.
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::Missed
                | Self::Fail
                | Self::Timeout
                | Self::Skip
                | Self::BadLink
                | Self::Error
                | Self::ProxyWebr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn canonical_codes_roundtrip_through_normalize() {
        for code in StatusCode::iter() {
            assert_eq!(StatusCode::normalize(&code.to_string()), Some(code));
        }
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(StatusCode::normalize("mist"), Some(StatusCode::Missed));
        assert_eq!(StatusCode::normalize("NOTMEMBER"), Some(StatusCode::NoAccess));
        assert_eq!(StatusCode::normalize("waitresult"), Some(StatusCode::Waiting));
        assert_eq!(StatusCode::normalize("block"), Some(StatusCode::BadLink));
        assert_eq!(StatusCode::normalize("bogus"), None);
    }

    #[test]
    fn wire_names_are_compact() {
        assert_eq!(StatusCode::NewMessage.to_string(), "NEWMSG");
        assert_eq!(StatusCode::ProxyTgr.to_string(), "PROXY_TGR");
        assert_eq!(StatusCode::NoLink.to_string(), "NO_LINK");
        assert_eq!(StatusCode::JoinFail.to_string(), "JOINFAIL");
    }

    #[test]
    fn labels_embed_detail_where_relevant() {
        assert_eq!(StatusCode::ProxyWebr.label("407"), "🧱 PROXY WEBR 407");
        assert_eq!(StatusCode::ProxyTgr.label(""), "🧱 PROXY TGR");
        assert_eq!(StatusCode::Delay.label("500ms"), "⏳ DELAY 500ms");
        assert_eq!(StatusCode::Success.label("ignored"), "✅ SUCCESS");
    }
}
