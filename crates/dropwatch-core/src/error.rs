// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Dropwatch engine.

use strum::Display;
use thiserror::Error;

use crate::status::StatusCode;

/// The primary error type used across all collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum DropwatchError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging transport errors (connect failure, fetch failure, flood limits).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A proxy in front of one of the two transports broke the connection.
    #[error("proxy error ({layer}): {hint}")]
    Proxy { layer: ProxyLayer, hint: String },

    /// Browser automation errors (launch, navigation, evaluation).
    #[error("browser error: {message}")]
    Browser {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The browser window or page was closed underneath us.
    #[error("browser target closed")]
    TargetClosed,

    /// Notification sink delivery failure.
    #[error("notification error: {message}")]
    Notify { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DropwatchError {
    /// Transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Browser error without an underlying source.
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
            source: None,
        }
    }

    /// Short variant name, used in row details such as `connect fail: Timeout`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "Config",
            Self::Transport { .. } => "Transport",
            Self::Proxy { .. } => "Proxy",
            Self::Browser { .. } => "Browser",
            Self::TargetClosed => "TargetClosed",
            Self::Notify { .. } => "Notify",
            Self::Timeout { .. } => "Timeout",
            Self::Io(_) => "Io",
            Self::Internal(_) => "Internal",
        }
    }

    /// Full message including the source chain, for proxy classification.
    pub fn full_message(&self) -> String {
        let mut out = self.to_string();
        let mut cur = std::error::Error::source(self);
        while let Some(err) = cur {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cur = err.source();
        }
        out
    }
}

/// Which transport a proxy failure broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ProxyLayer {
    /// The messaging transport (status `PROXY_TGR`).
    #[strum(serialize = "messaging")]
    Messaging,
    /// The browser transport (status `PROXY_WEBR`).
    #[strum(serialize = "browser")]
    Browser,
}

impl ProxyLayer {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Messaging => StatusCode::ProxyTgr,
            Self::Browser => StatusCode::ProxyWebr,
        }
    }
}

const PROXY_MARKERS: &[&str] = &[
    "proxy",
    "generalproxyerror",
    "proxyconnectionerror",
    "err_proxy",
    "407",
    "socks",
];

/// Classifies an error message as proxy-related.
///
/// Returns `None` when the message does not look like a proxy failure,
/// otherwise a short hint (`407`, `RESET`, `REFUSED`, `TIMEOUT`, `CLOSED`)
/// or an empty string when no finer hint applies.
pub fn classify_proxy_error(msg: &str) -> Option<&'static str> {
    let s = msg.to_lowercase();
    if !PROXY_MARKERS.iter().any(|m| s.contains(m)) {
        return None;
    }
    Some(proxy_hint(&s))
}

fn proxy_hint(s: &str) -> &'static str {
    if s.contains("407") {
        "407"
    } else if s.contains("reset") {
        "RESET"
    } else if s.contains("refused") {
        "REFUSED"
    } else if s.contains("timeout") || s.contains("timed out") {
        "TIMEOUT"
    } else if s.contains("closed") || s.contains("0 bytes read") {
        "CLOSED"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_proxy_message_is_not_classified() {
        assert_eq!(classify_proxy_error("connection reset by peer"), None);
        assert_eq!(classify_proxy_error(""), None);
    }

    #[test]
    fn proxy_hints_follow_priority() {
        assert_eq!(
            classify_proxy_error("Proxy auth: 407 reset"),
            Some("407")
        );
        assert_eq!(
            classify_proxy_error("SOCKS connection reset"),
            Some("RESET")
        );
        assert_eq!(
            classify_proxy_error("net::ERR_PROXY_CONNECTION_FAILED refused"),
            Some("REFUSED")
        );
        assert_eq!(
            classify_proxy_error("ProxyConnectionError: timed out"),
            Some("TIMEOUT")
        );
        assert_eq!(
            classify_proxy_error("GeneralProxyError: 0 bytes read"),
            Some("CLOSED")
        );
        assert_eq!(classify_proxy_error("socks5 handshake"), Some(""));
    }

    #[test]
    fn proxy_layer_maps_to_status() {
        assert_eq!(ProxyLayer::Messaging.status(), StatusCode::ProxyTgr);
        assert_eq!(ProxyLayer::Browser.status(), StatusCode::ProxyWebr);
    }

    #[test]
    fn full_message_includes_source_chain() {
        let err = DropwatchError::Transport {
            message: "connect".into(),
            source: Some(Box::new(std::io::Error::other("proxy refused"))),
        };
        assert_eq!(err.full_message(), "transport error: connect: proxy refused");
        assert_eq!(err.kind(), "Transport");
    }

    proptest::proptest! {
        #[test]
        fn messages_without_markers_are_never_proxy(msg in "[a-z0-9 :]{0,60}") {
            proptest::prop_assume!(!PROXY_MARKERS.iter().any(|m| msg.contains(m)));
            proptest::prop_assert_eq!(classify_proxy_error(&msg), None);
        }
    }
}
