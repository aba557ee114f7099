// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Link extraction and link hygiene helpers.
//!
//! Everything here is pure: the resolver and worker call these on fetched
//! posts and landing URLs.

use std::sync::LazyLock;

use dropwatch_core::{ChannelRef, Post};
use regex::Regex;
use url::Url;

static URL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

static APP_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:t\.me|telegram\.me)/[^/\s]+/[^?\s]+").unwrap());

static DOLLAR_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\s*\d+").unwrap());

static GTD_CHUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[^.\n]{0,120}GTD[^.\n]{0,20}").unwrap());

static GTD_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:[\s,]\d{3})+|\d+\s*K)\s*GTD").unwrap()
});

static PRIVATE_MESSAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"t\.me/c/(\d+)/(\d+)").unwrap());

static PUBLIC_MESSAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"t\.me/([A-Za-z0-9_]+)/(\d+)").unwrap());

/// Whether `url` looks like a first-party mini-app deep link.
///
/// Requires a `t.me/` or `telegram.me/` host and either a start parameter
/// or a `<bot>/<app>` path.
pub fn is_deep_link(url: &str) -> bool {
    let u = url.to_lowercase();
    if !u.contains("t.me/") && !u.contains("telegram.me/") {
        return false;
    }
    u.contains("startapp=") || u.contains("start=") || APP_PATH.is_match(&u)
}

/// Adds a scheme to bare `t.me/...` and protocol-relative links.
pub fn normalize_deep_link(url: &str) -> String {
    let u = url.trim();
    let lower = u.to_lowercase();
    if lower.starts_with("t.me/") || lower.starts_with("telegram.me/") {
        format!("https://{u}")
    } else if lower.starts_with("//t.me/") || lower.starts_with("//telegram.me/") {
        format!("https:{u}")
    } else {
        u.to_string()
    }
}

/// Whether a link points at the first-party messenger (web host or `tg://`).
pub fn is_first_party_link(url: &str) -> bool {
    let u = normalize_deep_link(url).to_lowercase();
    [
        "https://t.me/",
        "http://t.me/",
        "https://telegram.me/",
        "http://telegram.me/",
        "tg://",
    ]
    .iter()
    .any(|prefix| u.starts_with(prefix))
}

/// Launch URL of a post, without the any-URL fallback.
///
/// Precedence: an inline button whose label equals `launch_text`
/// (case-insensitive; an empty `launch_text` accepts any button), then a
/// deep link from entities, the link preview, or the text.
pub fn extract_launch_url(post: &Post, launch_text: &str) -> Option<String> {
    let target = launch_text.trim().to_lowercase();
    let from_button = post
        .buttons
        .iter()
        .filter(|b| target.is_empty() || b.label.trim().to_lowercase() == target)
        .map(|b| b.url())
        .find(|u| !u.is_empty());
    if let Some(url) = from_button {
        return Some(url.to_string());
    }
    first_url(post, is_deep_link)
}

/// First URL of any kind: entities, then preview, then text.
pub fn extract_any_url(post: &Post) -> Option<String> {
    first_url(post, |u| !u.is_empty())
}

fn first_url(post: &Post, accept: impl Fn(&str) -> bool) -> Option<String> {
    post.entities
        .iter()
        .map(|e| e.url().to_string())
        .chain(post.preview_url.clone())
        .chain(scan_text_url(&post.text))
        .find(|u| accept(u))
}

fn scan_text_url(text: &str) -> Option<String> {
    URL_IN_TEXT
        .find(text)
        .map(|m| m.as_str().trim_end_matches([')', '.', ',', ';']).to_string())
}

/// Opportunistic reward label: the first `$N` token and the first
/// `<N> GTD` token, space separated. Thousands render as `50K GTD`.
pub fn extract_ticket_label(text: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(m) = DOLLAR_AMOUNT.find(text) {
        parts.push(m.as_str().replace(' ', ""));
    }

    let collapsed = collapse_whitespace(text);
    let gtd = GTD_CHUNK
        .find(&collapsed)
        .and_then(|chunk| GTD_VALUE.captures(chunk.as_str()))
        .map(|caps| format_gtd(&caps[1]));
    if let Some(label) = gtd
        && !parts.contains(&label)
    {
        parts.push(label);
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn format_gtd(raw: &str) -> String {
    let value: String = raw.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    if value.to_lowercase().ends_with('k') {
        return format!("{} GTD", value.to_uppercase());
    }
    match value.parse::<u64>() {
        Ok(n) if n >= 1000 && n % 1000 == 0 => format!("{}K GTD", n / 1000),
        Ok(n) => format!("{n} GTD"),
        Err(_) => format!("{value} GTD"),
    }
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Why a message link could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadMessageLink;

impl std::fmt::Display for BadMessageLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("bad link")
    }
}

impl std::error::Error for BadMessageLink {}

/// Parses `t.me/<name>/<id>` and `t.me/c/<internal>/<id>` message links.
///
/// Private (`c/`) links map to the channel id `-100<internal>`.
pub fn parse_message_link(link: &str) -> Result<(ChannelRef, i64), BadMessageLink> {
    let s = link.trim();
    if let Some(caps) = PRIVATE_MESSAGE_LINK.captures(s) {
        let chat_id = format!("-100{}", &caps[1])
            .parse::<i64>()
            .map_err(|_| BadMessageLink)?;
        let msg_id = caps[2].parse::<i64>().map_err(|_| BadMessageLink)?;
        return Ok((ChannelRef::Id(chat_id), msg_id));
    }
    if let Some(caps) = PUBLIC_MESSAGE_LINK.captures(s) {
        let msg_id = caps[2].parse::<i64>().map_err(|_| BadMessageLink)?;
        return Ok((ChannelRef::Username(caps[1].to_string()), msg_id));
    }
    Err(BadMessageLink)
}

/// Strips the fragment and every query parameter except `tgWebAppStartParam`.
///
/// Web-app fragments carry signed init data; this is the only form of a
/// landing URL that may be logged.
pub fn safe_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.split('#').next().unwrap_or_default().to_string();
    };
    url.set_fragment(None);
    let keep = url
        .query_pairs()
        .find(|(k, v)| k == "tgWebAppStartParam" && !v.is_empty())
        .map(|(_, v)| v.into_owned());
    match keep {
        Some(value) => {
            url.query_pairs_mut()
                .clear()
                .append_pair("tgWebAppStartParam", &value);
        }
        None => url.set_query(None),
    }
    url.to_string()
}

/// Lowercased host without a leading `www.`.
pub fn host_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// The skip-listed domain `raw` landed on, if any.
///
/// A domain matches itself and any of its subdomains.
pub fn blocked_domain<'a>(raw: &str, domains: &'a [String]) -> Option<&'a str> {
    let host = host_key(raw)?;
    domains
        .iter()
        .map(|d| d.trim())
        .find(|d| {
            let d = d.to_lowercase();
            let d = d.strip_prefix("www.").unwrap_or(&d);
            !d.is_empty() && (host == d || host.ends_with(&format!(".{d}")))
        })
}
