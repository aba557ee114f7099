// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result detection: read the rendered page and classify it.
//!
//! Classification order is fixed:
//!
//! 1. hard "already claimed" phrases → `success`
//! 2. hard "expired / unavailable" phrases → `missed`
//! 3. configured fail phrases → `fail`
//! 4. configured success phrases, per [`SuccessMatch`] → `success`
//!
//! The first rule that fires wins, so claimed text beats a fail phrase and
//! expired text beats a success phrase.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dropwatch_config::{DropwatchConfig, SuccessMatch};
use dropwatch_core::{Detection, DropwatchError, Outcome};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::links::{blocked_domain, collapse_whitespace, safe_url};
use crate::session_pool::WarmSession;

/// Text that means the reward was already ours.
pub const CLAIMED_PHRASES: &[&str] = &[
    "already been claimed",
    "already claimed",
    "offer has already been claimed",
    "this offer has already been claimed",
];

/// Text that means the offer is gone.
pub const MISSED_PHRASES: &[&str] = &[
    "expired",
    "offer has expired",
    "this offer has expired",
    "no longer",
    "not available",
    "not availible",
    "unavailable",
];

const SNIPPET_CHARS: usize = 220;

/// Normalized success/fail phrase lists.
#[derive(Debug, Clone, Default)]
pub struct PhraseSet {
    success: Vec<String>,
    fail: Vec<String>,
    mode: SuccessMatch,
}

impl PhraseSet {
    pub fn new(success: &[String], fail: &[String], mode: SuccessMatch) -> Self {
        let norm = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|p| collapse_whitespace(p).to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            success: norm(success),
            fail: norm(fail),
            mode,
        }
    }
}

/// Page text prepared for matching.
struct PageText {
    /// Whole page, whitespace-collapsed and lowercased.
    norm: String,
    /// Non-empty lines, whitespace-collapsed, original case.
    lines: Vec<String>,
}

impl PageText {
    fn new(raw: &str) -> Self {
        Self {
            norm: collapse_whitespace(raw).to_lowercase(),
            lines: raw
                .lines()
                .map(collapse_whitespace)
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }

    /// First line containing `phrase`, or the phrase itself.
    fn line_with(&self, phrase: &str) -> String {
        self.lines
            .iter()
            .find(|l| l.to_lowercase().contains(phrase))
            .cloned()
            .unwrap_or_else(|| phrase.to_string())
    }

    fn first_match<'a, I>(&self, phrases: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        phrases
            .into_iter()
            .find(|p| !p.is_empty() && self.norm.contains(p))
            .map(|p| self.line_with(p))
    }
}

/// Classifies page text, or `None` when no rule fires yet.
pub fn classify_text(text: &str, phrases: &PhraseSet) -> Option<Detection> {
    let page = PageText::new(text);

    if let Some(detail) = page.first_match(CLAIMED_PHRASES.iter().copied()) {
        return Some(Detection::new(Outcome::Success, detail));
    }
    if let Some(detail) = page.first_match(MISSED_PHRASES.iter().copied()) {
        return Some(Detection::new(Outcome::Missed, detail));
    }
    if let Some(detail) = page.first_match(phrases.fail.iter().map(String::as_str)) {
        return Some(Detection::new(Outcome::Fail, detail));
    }
    match_success(&page, phrases).map(|detail| Detection::new(Outcome::Success, detail))
}

fn match_success(page: &PageText, phrases: &PhraseSet) -> Option<String> {
    let succ = &phrases.success;
    if succ.is_empty() {
        return None;
    }
    let same_line = || {
        page.lines
            .iter()
            .find(|l| {
                let low = l.to_lowercase();
                succ.iter().all(|p| low.contains(p.as_str()))
            })
            .cloned()
    };
    match phrases.mode {
        SuccessMatch::SameLine => same_line(),
        SuccessMatch::Any => page.first_match(succ.iter().map(String::as_str)),
        SuccessMatch::LineOrFirstTwo => same_line().or_else(|| {
            (succ.len() >= 2 && succ[..2].iter().all(|p| page.norm.contains(p.as_str())))
                .then(|| page.line_with(&succ[0]))
        }),
    }
}

/// Detection parameters derived from `[detect]` and `[browser]`.
#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub reload_cycles: u32,
    pub checks_per_cycle: u32,
    pub check_interval: Duration,
    pub ceiling: Duration,
    pub skip_domains: Vec<String>,
    pub phrases: PhraseSet,
    pub dump_on_fail: bool,
    pub dump_on_timeout: bool,
    /// `None` disables debug bundles.
    pub dump_dir: Option<PathBuf>,
}

impl DetectSettings {
    pub fn from_config(config: &DropwatchConfig) -> Self {
        let d = &config.detect;
        Self {
            reload_cycles: d.reload_cycles.max(1),
            checks_per_cycle: d.checks_per_cycle.max(1),
            check_interval: Duration::from_millis(d.check_interval_ms),
            ceiling: d.effective_ceiling(),
            skip_domains: d.skip_domains.clone(),
            phrases: PhraseSet::new(&d.success_patterns, &d.fail_patterns, d.success_match),
            dump_on_fail: d.dump_on_fail,
            dump_on_timeout: d.dump_on_timeout,
            dump_dir: Some(config.dump_dir()),
        }
    }
}

/// Drives one warm session through navigate, skip check and check cycles.
#[derive(Debug, Clone)]
pub struct ResultDetector {
    settings: DetectSettings,
}

impl ResultDetector {
    pub fn new(settings: DetectSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectSettings {
        &self.settings
    }

    /// Opens `url` and returns the outcome, bounded by the hard ceiling.
    pub async fn detect(&self, session: &mut WarmSession, url: &str, actor: &str) -> Detection {
        let ceiling = self.settings.ceiling;
        let started = Instant::now();
        let bounded =
            tokio::time::timeout(ceiling, self.run_checks(session, url, actor, started)).await;
        let detection = match bounded {
            Ok(detection) => detection,
            Err(_) => {
                let detail = format!("auto-stop after {}s | url={}", ceiling.as_secs(), safe_url(url));
                let detail = self.maybe_dump(session, actor, "timeout", detail, url).await;
                Detection::new(Outcome::Timeout, detail)
            }
        };
        info!(
            actor,
            outcome = %detection.outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detection finished"
        );
        detection
    }

    async fn run_checks(
        &self,
        session: &mut WarmSession,
        url: &str,
        actor: &str,
        started: Instant,
    ) -> Detection {
        let s = &self.settings;

        if let Err(e) = session.navigate(url).await {
            return failure(e, "navigate");
        }

        let landed = session
            .current_url()
            .await
            .unwrap_or_else(|_| url.to_string());
        if let Some(domain) = blocked_domain(&landed, &s.skip_domains) {
            return Detection::new(
                Outcome::Skip,
                format!("blocked domain={domain} | url={}", safe_url(&landed)),
            );
        }

        let mut last_text = String::new();
        for cycle in 0..s.reload_cycles {
            if session.is_closed() {
                return user_stop();
            }
            if cycle > 0
                && let Err(e) = session.reload().await
            {
                return failure(e, "reload");
            }
            for check in 0..s.checks_per_cycle {
                if session.is_closed() {
                    return user_stop();
                }
                let text = match session.read_visible_text().await {
                    Ok(text) => text,
                    Err(e) => return failure(e, "read"),
                };
                if let Some(detection) = classify_text(&text, &s.phrases) {
                    debug!(actor, cycle, check, outcome = %detection.outcome, "page classified");
                    if detection.outcome == Outcome::Fail && s.dump_on_fail {
                        let detail = self
                            .maybe_dump(session, actor, "fail", detection.detail, url)
                            .await;
                        return Detection::new(Outcome::Fail, detail);
                    }
                    return detection;
                }
                last_text = text;
                let last = cycle + 1 == s.reload_cycles && check + 1 == s.checks_per_cycle;
                if !last {
                    tokio::time::sleep(s.check_interval).await;
                }
            }
        }

        let snippet: String = collapse_whitespace(&last_text)
            .to_lowercase()
            .chars()
            .take(SNIPPET_CHARS)
            .collect();
        let detail = format!(
            "no match after {}ms (cycles={}, checks={}, interval_ms={}) | url={} | snippet='{}'",
            started.elapsed().as_millis(),
            s.reload_cycles,
            s.checks_per_cycle,
            s.check_interval.as_millis(),
            safe_url(&landed),
            snippet,
        );
        let detail = self.maybe_dump(session, actor, "timeout", detail, url).await;
        Detection::new(Outcome::Timeout, detail)
    }

    /// Appends `| dump=<path>` when a bundle was written.
    async fn maybe_dump(
        &self,
        session: &mut WarmSession,
        actor: &str,
        reason: &str,
        detail: String,
        url: &str,
    ) -> String {
        let enabled = match reason {
            "fail" => self.settings.dump_on_fail,
            _ => self.settings.dump_on_timeout,
        };
        let Some(dir) = self.settings.dump_dir.as_deref().filter(|_| enabled) else {
            return detail;
        };
        match write_dump(dir, session, actor, reason, &detail, url).await {
            Some(path) => format!("{detail} | dump={}", path.display()),
            None => detail,
        }
    }
}

fn user_stop() -> Detection {
    Detection::new(Outcome::UserStop, "browser closed")
}

fn failure(err: DropwatchError, stage: &str) -> Detection {
    match err {
        DropwatchError::TargetClosed => user_stop(),
        other => {
            warn!(stage, error = %other, "detection failed");
            Detection::new(Outcome::Error, other.full_message())
        }
    }
}

/// Writes a best-effort debug bundle and returns its folder.
///
/// Layout: `<dir>/<YYYYmmdd_HHMMSS>_<actor>/{meta.json,page.txt,page.html,shot.png}`.
pub async fn write_dump(
    dir: &Path,
    session: &mut WarmSession,
    actor: &str,
    reason: &str,
    detail: &str,
    url: &str,
) -> Option<PathBuf> {
    let stamp = chrono::Local::now();
    let safe_actor: String = actor
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let folder = dir.join(format!("{}_{safe_actor}", stamp.format("%Y%m%d_%H%M%S")));
    if let Err(e) = tokio::fs::create_dir_all(&folder).await {
        warn!(path = %folder.display(), error = %e, "cannot create dump folder");
        return None;
    }

    let options = session.options().clone();
    let meta = serde_json::json!({
        "ts": stamp.to_rfc3339(),
        "reason": reason,
        "detail": detail,
        "url": safe_url(url),
        "headless": options.headless,
        "profile_dir": options.profile_dir.display().to_string(),
    });
    let meta = serde_json::to_vec_pretty(&meta).unwrap_or_default();
    let _ = tokio::fs::write(folder.join("meta.json"), meta).await;

    if let Ok(text) = session.read_visible_text().await {
        let _ = tokio::fs::write(folder.join("page.txt"), text).await;
    }
    if let Ok(html) = session.content().await {
        let _ = tokio::fs::write(folder.join("page.html"), html).await;
    }
    if let Ok(png) = session.screenshot().await {
        let _ = tokio::fs::write(folder.join("shot.png"), png).await;
    }
    debug!(path = %folder.display(), reason, "debug bundle written");
    Some(folder)
}
