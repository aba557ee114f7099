// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Link resolution for accepted posts.
//!
//! A freshly announced post is often not fully visible yet (buttons and
//! previews arrive late), so the resolver re-fetches it on a fixed schedule
//! until a launch URL shows up.

use std::time::Duration;

use dropwatch_core::{ChannelHandle, MessagingSource, Post, PostKey};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::links::{extract_any_url, extract_launch_url, extract_ticket_label};

/// Attempt offsets from submission, in milliseconds.
pub const RESOLVE_SCHEDULE_MS: [u64; 5] = [0, 200, 500, 1000, 1500];

/// What the resolver found for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub url: Option<String>,
    pub ticket: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkResolver {
    launch_text: String,
    fallback: bool,
    schedule: Vec<Duration>,
}

impl LinkResolver {
    pub fn new(launch_text: impl Into<String>, fallback: bool) -> Self {
        Self {
            launch_text: launch_text.into(),
            fallback,
            schedule: RESOLVE_SCHEDULE_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    /// Launch URL of an already fetched post, honoring the fallback flag.
    pub fn url_of(&self, post: &Post) -> Option<String> {
        extract_launch_url(post, &self.launch_text).or_else(|| {
            if self.fallback {
                extract_any_url(post)
            } else {
                None
            }
        })
    }

    /// Resolves one post fetched directly (replay mode).
    pub fn resolve_post(&self, post: &Post) -> Resolution {
        Resolution {
            url: self.url_of(post),
            ticket: extract_ticket_label(&post.text),
        }
    }

    /// Re-fetches `key` on the fixed schedule until a URL is found.
    ///
    /// Fetch errors are per-attempt and swallowed; only the final absence
    /// of a URL is reported, as `url: None`. The ticket label comes from
    /// the first attempt that returned any text.
    pub async fn resolve(
        &self,
        source: &dyn MessagingSource,
        channel: &ChannelHandle,
        key: PostKey,
    ) -> Resolution {
        let start = Instant::now();
        let mut ticket: Option<Option<String>> = None;

        for (attempt, offset) in self.schedule.iter().enumerate() {
            tokio::time::sleep_until(start + *offset).await;
            let post = match source.fetch_by_id(channel, key.msg_id).await {
                Ok(Some(post)) => post,
                Ok(None) => {
                    trace!(%key, attempt, "post not visible yet");
                    continue;
                }
                Err(e) => {
                    debug!(%key, attempt, error = %e, "fetch attempt failed");
                    continue;
                }
            };
            if ticket.is_none() && !post.text.trim().is_empty() {
                ticket = Some(extract_ticket_label(&post.text));
            }
            if let Some(url) = self.url_of(&post) {
                debug!(%key, attempt, "launch url resolved");
                return Resolution {
                    url: Some(url),
                    ticket: ticket.flatten(),
                };
            }
        }

        debug!(%key, "no launch url after all attempts");
        Resolution {
            url: None,
            ticket: ticket.flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> Post {
        Post {
            text: text.to_string(),
            ..Post::default()
        }
    }

    #[test]
    fn fallback_flag_controls_any_url() {
        let p = post("go to https://drops.example/x");
        assert_eq!(LinkResolver::new("Launch", false).url_of(&p), None);
        assert_eq!(
            LinkResolver::new("Launch", true).url_of(&p).as_deref(),
            Some("https://drops.example/x")
        );
    }

    #[test]
    fn resolve_post_extracts_ticket() {
        let r = LinkResolver::new("Launch", true)
            .resolve_post(&post("$25 drop https://t.me/bot/app?startapp=1"));
        assert_eq!(r.url.as_deref(), Some("https://t.me/bot/app?startapp=1"));
        assert_eq!(r.ticket.as_deref(), Some("$25"));
    }
}
