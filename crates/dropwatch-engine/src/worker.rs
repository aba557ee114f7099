// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-actor open worker.
//!
//! Consumes the actor's open queue one item at a time:
//!
//! ```text
//! idle → delaying → opening → detecting → outcome → idle
//! ```
//!
//! A second delivery of the post it opened last is dropped silently.

use std::sync::Arc;
use std::time::Duration;

use dropwatch_config::DelaySpec;
use dropwatch_core::{
    Detection, MessagingSource, Outcome, PostKey, StatusCode, classify_proxy_error,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::{ActorSpec, RunContext};
use crate::controller::ControlCommand;
use crate::detector::ResultDetector;
use crate::fanout::OpenItem;
use crate::generation::Generation;
use crate::links::{is_first_party_link, normalize_deep_link};
use crate::session_pool::SharedSession;

pub struct ActorOpenWorker {
    label: String,
    source: Arc<dyn MessagingSource>,
    has_proxy: bool,
    session: SharedSession,
    detector: ResultDetector,
    ctx: RunContext,
    generation: Generation,
    delay: DelaySpec,
    last_key: Option<PostKey>,
}

impl ActorOpenWorker {
    pub fn new(
        ctx: &RunContext,
        spec: &ActorSpec,
        session: SharedSession,
        detector: ResultDetector,
        generation: Generation,
    ) -> Self {
        let delay = DelaySpec::parse(&ctx.config.open.pre_open_delay_ms).unwrap_or_else(|e| {
            warn!(actor = %spec.label, error = %e, "bad pre-open delay, using none");
            DelaySpec::default()
        });
        Self {
            label: spec.label.clone(),
            source: spec.source.clone(),
            has_proxy: spec.proxy.is_some(),
            session,
            detector,
            ctx: ctx.clone(),
            generation,
            delay,
            last_key: None,
        }
    }

    /// Processes items until the queue closes or the task is cancelled.
    pub async fn run(mut self, mut rx: mpsc::Receiver<OpenItem>) {
        while let Some(item) = rx.recv().await {
            self.handle(item).await;
        }
        debug!(actor = %self.label, "open queue closed");
    }

    /// Opens one item. Returns `None` when the item was a repeat.
    pub async fn handle(&mut self, item: OpenItem) -> Option<Detection> {
        if self.last_key == Some(item.key) {
            debug!(actor = %self.label, key = %item.key, "repeat delivery ignored");
            return None;
        }
        self.last_key = Some(item.key);

        let rows = &self.ctx.rows;
        let live = !self.ctx.is_replay();
        let ticket = item.ticket.as_deref().unwrap_or("");
        let link = normalize_deep_link(&item.url);

        if self.ctx.config.open.only_first_party_links && !is_first_party_link(&link) {
            rows.update(&self.label, StatusCode::BadLink, "not tg link", ticket);
            if live {
                self.cooldown(StatusCode::BadLink, self.ctx.config.open.bad_link_cooldown_secs);
            }
            return Some(Detection::new(Outcome::Skip, "not tg link"));
        }

        let delay_ms = self.delay.choose();
        if delay_ms > 0 {
            rows.update(&self.label, StatusCode::Delay, &format!("{delay_ms}ms"), ticket);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        rows.update(&self.label, StatusCode::Opening, "", ticket);
        let target = match self.source.request_web_view(&link).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                rows.update(&self.label, StatusCode::Error, "no webview url", "");
                return Some(Detection::new(Outcome::Error, "no webview url"));
            }
            Err(e) => {
                let detail = format!("webview {}", e.kind());
                warn!(actor = %self.label, error = %e, "web view request failed");
                rows.update(&self.label, StatusCode::Error, &detail, "");
                return Some(Detection::new(Outcome::Error, detail));
            }
        };

        let detection = {
            let mut session = self.session.lock().await;
            self.detector.detect(&mut session, &target, &self.label).await
        };
        self.apply(&detection).await;
        Some(detection)
    }

    async fn apply(&self, detection: &Detection) {
        let rows = &self.ctx.rows;
        let live = !self.ctx.is_replay();
        let detail = detection.detail.as_str();
        debug!(actor = %self.label, outcome = %detection.outcome, "applying outcome");

        match detection.outcome {
            Outcome::Success => {
                rows.update(&self.label, StatusCode::Success, detail, "");
                let total = self.ctx.rewards.bump().await;
                debug!(actor = %self.label, total, "reward counted");
                self.ctx.notifier.success(&self.label, detail);
            }
            Outcome::Missed | Outcome::Fail | Outcome::Timeout => {
                rows.update(&self.label, detection.outcome.status(), detail, "");
            }
            Outcome::Skip if detail.contains("blocked domain") => {
                rows.update(&self.label, StatusCode::BadLink, detail, "");
                if live {
                    self.cooldown(StatusCode::BadLink, self.ctx.config.open.bad_link_cooldown_secs);
                }
            }
            Outcome::Skip => {
                rows.update(&self.label, StatusCode::Skip, detail, "");
            }
            Outcome::UserStop => {
                let detail = if detail.is_empty() { "browser closed" } else { detail };
                rows.update(&self.label, StatusCode::Stopped, detail, "");
                self.ctx.request(ControlCommand::Pause);
            }
            Outcome::Error => {
                match classify_proxy_error(detail).filter(|_| self.has_proxy) {
                    Some(hint) => {
                        let hint = if hint.is_empty() { "ERROR" } else { hint };
                        rows.update(&self.label, StatusCode::ProxyWebr, hint, "");
                    }
                    None => {
                        rows.update(&self.label, StatusCode::Error, detail, "");
                    }
                }
                self.ctx.notifier.error(&self.label, detail);
            }
        }
    }

    fn cooldown(&self, from: StatusCode, secs: u64) {
        self.generation.spawn_cooldown(
            &self.ctx.rows,
            &self.label,
            Duration::from_secs(secs),
            from,
            StatusCode::Monitoring,
        );
    }
}
