// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Dropwatch engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use dropwatch_core::WaitPolicy;
use serde::{Deserialize, Serialize};

/// Top-level Dropwatch configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections except `[[actors]]` default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DropwatchConfig {
    /// Process-level settings (data directory, log level).
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Which channel to watch and how.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Per-actor open behaviour.
    #[serde(default)]
    pub open: OpenConfig,

    /// Result detection on the rendered page.
    #[serde(default)]
    pub detect: DetectConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    /// Messaging transport connect policy.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Operator notifications.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Actor identities racing to open each post.
    #[serde(default)]
    pub actors: Vec<ActorConfig>,
}

impl DropwatchConfig {
    /// Directory holding `status_live.tsv`, crash logs and dumps.
    pub fn logs_dir(&self) -> PathBuf {
        self.daemon.data_dir.join("logs")
    }

    /// Root directory for debug bundles.
    pub fn dump_dir(&self) -> PathBuf {
        self.detect
            .dump_dir
            .clone()
            .unwrap_or_else(|| self.logs_dir().join("dumps"))
    }

    /// Root directory for persistent browser profiles.
    pub fn profile_root(&self) -> PathBuf {
        self.browser
            .profile_root
            .clone()
            .unwrap_or_else(|| self.daemon.data_dir.join("profiles"))
    }

    /// Profile directory of one actor.
    pub fn profile_dir(&self, actor: &ActorConfig) -> PathBuf {
        actor
            .profile_dir
            .clone()
            .unwrap_or_else(|| self.profile_root().join(sanitize_dir_name(&actor.label)))
    }

    /// File holding the persisted success counter.
    pub fn rewards_path(&self) -> PathBuf {
        self.daemon.data_dir.join("rewards.count")
    }
}

fn sanitize_dir_name(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("dropwatch"))
        .unwrap_or_else(|| PathBuf::from(".dropwatch"))
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Live monitoring, or a one-shot replay of an existing post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    #[default]
    Live,
    Replay,
}

/// Which discovery paths feed the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum MonitorMode {
    #[default]
    #[serde(rename = "live+poll", alias = "both", alias = "live_and_poll")]
    LiveAndPoll,
    #[serde(rename = "live_only")]
    LiveOnly,
    #[serde(rename = "poll_only")]
    PollOnly,
}

impl MonitorMode {
    pub fn listens(self) -> bool {
        matches!(self, Self::LiveAndPoll | Self::LiveOnly)
    }

    pub fn polls(self) -> bool {
        matches!(self, Self::LiveAndPoll | Self::PollOnly)
    }
}

/// Watched channel and discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// `@name`, numeric id, `t.me/+hash` or `t.me/joinchat/hash`.
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub mode: WatchMode,

    /// Message link opened once in replay mode.
    #[serde(default)]
    pub replay_link: Option<String>,

    #[serde(default)]
    pub monitor: MonitorMode,

    #[serde(default = "default_one_sec")]
    pub poll_interval_secs: f64,

    #[serde(default = "default_one_sec")]
    pub keepalive_interval_secs: f64,

    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default = "default_open_queue_depth")]
    pub open_queue_depth: usize,

    /// Inline button label to prefer; empty accepts any button.
    #[serde(default = "default_launch_button_text")]
    pub launch_button_text: String,

    /// Accept any URL in the post when no deep link is found.
    #[serde(default = "default_true")]
    pub link_fallback: bool,

    /// Headed runs pause themselves after this many seconds (0 disables).
    #[serde(default = "default_auto_stop_secs")]
    pub auto_stop_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            mode: WatchMode::default(),
            replay_link: None,
            monitor: MonitorMode::default(),
            poll_interval_secs: default_one_sec(),
            keepalive_interval_secs: default_one_sec(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            bus_capacity: default_bus_capacity(),
            open_queue_depth: default_open_queue_depth(),
            launch_button_text: default_launch_button_text(),
            link_fallback: true,
            auto_stop_secs: default_auto_stop_secs(),
        }
    }
}

/// Lower bound for the dedup TTL.
pub const MIN_DEDUP_TTL_SECS: u64 = 600;

impl WatchConfig {
    /// Configured poll tick, before the per-actor rate floor is applied.
    pub fn effective_poll_interval(&self) -> Duration {
        positive_secs(self.poll_interval_secs)
    }

    pub fn effective_keepalive_interval(&self) -> Duration {
        positive_secs(self.keepalive_interval_secs)
    }

    pub fn effective_dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs.max(MIN_DEDUP_TTL_SECS))
    }

    pub fn effective_auto_stop(&self) -> Option<Duration> {
        (self.auto_stop_secs > 0).then(|| Duration::from_secs(self.auto_stop_secs))
    }
}

fn positive_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs(1)
    }
}

fn default_one_sec() -> f64 {
    1.0
}

fn default_dedup_ttl_secs() -> u64 {
    1800
}

fn default_bus_capacity() -> usize {
    200
}

fn default_open_queue_depth() -> usize {
    25
}

fn default_launch_button_text() -> String {
    "Launch".to_string()
}

fn default_auto_stop_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Per-actor open configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConfig {
    /// Fixed `N` or inclusive range `A-B`, in milliseconds.
    #[serde(default = "default_pre_open_delay")]
    pub pre_open_delay_ms: String,

    #[serde(default = "default_true")]
    pub only_first_party_links: bool,

    #[serde(default = "default_bad_link_cooldown")]
    pub bad_link_cooldown_secs: u64,

    #[serde(default = "default_no_link_cooldown")]
    pub no_link_cooldown_secs: u64,
}

impl Default for OpenConfig {
    fn default() -> Self {
        Self {
            pre_open_delay_ms: default_pre_open_delay(),
            only_first_party_links: true,
            bad_link_cooldown_secs: default_bad_link_cooldown(),
            no_link_cooldown_secs: default_no_link_cooldown(),
        }
    }
}

fn default_pre_open_delay() -> String {
    "500".to_string()
}

fn default_bad_link_cooldown() -> u64 {
    120
}

fn default_no_link_cooldown() -> u64 {
    10
}

/// How configured success phrases must co-occur on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessMatch {
    /// All phrases on one line, or the first two anywhere on the page.
    #[default]
    LineOrFirstTwo,
    /// All phrases on one line.
    SameLine,
    /// Any single phrase anywhere.
    Any,
}

/// Hard upper bound for one detection, regardless of configuration.
pub const MAX_DETECT_CEILING_SECS: u64 = 300;

/// Result detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DetectConfig {
    #[serde(default = "default_reload_cycles")]
    pub reload_cycles: u32,

    #[serde(default = "default_checks_per_cycle")]
    pub checks_per_cycle: u32,

    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    #[serde(default = "default_hard_ceiling_secs")]
    pub hard_ceiling_secs: u64,

    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Landing domains that never render result text.
    #[serde(default = "default_skip_domains")]
    pub skip_domains: Vec<String>,

    #[serde(default = "default_success_patterns")]
    pub success_patterns: Vec<String>,

    #[serde(default = "default_fail_patterns")]
    pub fail_patterns: Vec<String>,

    #[serde(default)]
    pub success_match: SuccessMatch,

    #[serde(default = "default_true")]
    pub dump_on_fail: bool,

    #[serde(default = "default_true")]
    pub dump_on_timeout: bool,

    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            reload_cycles: default_reload_cycles(),
            checks_per_cycle: default_checks_per_cycle(),
            check_interval_ms: default_check_interval_ms(),
            hard_ceiling_secs: default_hard_ceiling_secs(),
            nav_timeout_ms: default_nav_timeout_ms(),
            skip_domains: default_skip_domains(),
            success_patterns: default_success_patterns(),
            fail_patterns: default_fail_patterns(),
            success_match: SuccessMatch::default(),
            dump_on_fail: true,
            dump_on_timeout: true,
            dump_dir: None,
        }
    }
}

impl DetectConfig {
    /// Global ceiling, clamped to [`MAX_DETECT_CEILING_SECS`].
    pub fn effective_ceiling(&self) -> Duration {
        Duration::from_secs(self.hard_ceiling_secs.clamp(1, MAX_DETECT_CEILING_SECS))
    }
}

fn default_reload_cycles() -> u32 {
    1
}

fn default_checks_per_cycle() -> u32 {
    5
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_hard_ceiling_secs() -> u64 {
    MAX_DETECT_CEILING_SECS
}

fn default_nav_timeout_ms() -> u64 {
    15_000
}

fn default_skip_domains() -> Vec<String> {
    [
        "twitch.tv",
        "instagram.com",
        "x.com",
        "twitter.com",
        "kick.com",
        "youtube.com",
        "youtu.be",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_success_patterns() -> Vec<String> {
    vec!["you got".to_string(), "ticket".to_string()]
}

fn default_fail_patterns() -> Vec<String> {
    vec![
        "this offer has expired".to_string(),
        "keep an eye out for new offers".to_string(),
    ]
}

/// Login-state handling for browser sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStateMode {
    #[default]
    Off,
    Use,
    Capture,
}

/// Browser automation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,

    #[serde(default)]
    pub wait_until: WaitPolicy,

    #[serde(default)]
    pub profile_root: Option<PathBuf>,

    #[serde(default)]
    pub storage_state: StorageStateMode,

    #[serde(default)]
    pub storage_state_path: Option<PathBuf>,

    /// Chromium binary; auto-detected when unset.
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

/// Messaging transport connect policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_secs: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            backoff_initial_secs: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_backoff_initial() -> u64 {
    2
}

fn default_backoff_max() -> u64 {
    30
}

/// Operator notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bot API token used to deliver notifications.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Numeric chat id receiving notifications.
    #[serde(default)]
    pub chat_id: Option<String>,

    /// Also notify on `error` outcomes.
    #[serde(default)]
    pub on_error: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            chat_id: None,
            on_error: false,
        }
    }
}

impl NotifyConfig {
    /// Whether notifications can actually be delivered.
    pub fn is_active(&self) -> bool {
        self.enabled
            && self.bot_token.as_deref().is_some_and(|t| !t.trim().is_empty())
            && self.chat_id.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// One actor identity from `[[actors]]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActorConfig {
    /// Row label; must be unique.
    pub label: String,

    /// Transport credential for this actor.
    pub bot_token: String,

    /// `host:port[:user:pass]`
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub profile_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DropwatchConfig::default();
        assert_eq!(cfg.watch.bus_capacity, 200);
        assert_eq!(cfg.watch.open_queue_depth, 25);
        assert_eq!(cfg.watch.dedup_ttl_secs, 1800);
        assert_eq!(cfg.detect.reload_cycles, 1);
        assert_eq!(cfg.detect.checks_per_cycle, 5);
        assert_eq!(cfg.detect.check_interval_ms, 5000);
        assert_eq!(cfg.detect.skip_domains.len(), 7);
        assert_eq!(cfg.transport.backoff_initial_secs, 2);
        assert_eq!(cfg.transport.backoff_max_secs, 30);
        assert_eq!(cfg.open.pre_open_delay_ms, "500");
        assert!(cfg.actors.is_empty());
    }

    #[test]
    fn dedup_ttl_has_a_floor() {
        let watch = WatchConfig {
            dedup_ttl_secs: 60,
            ..WatchConfig::default()
        };
        assert_eq!(watch.effective_dedup_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn non_positive_intervals_fall_back_to_one_second() {
        let watch = WatchConfig {
            poll_interval_secs: 0.0,
            keepalive_interval_secs: -3.0,
            ..WatchConfig::default()
        };
        assert_eq!(watch.effective_poll_interval(), Duration::from_secs(1));
        assert_eq!(watch.effective_keepalive_interval(), Duration::from_secs(1));
    }

    #[test]
    fn detect_ceiling_is_clamped() {
        let detect = DetectConfig {
            hard_ceiling_secs: 900,
            ..DetectConfig::default()
        };
        assert_eq!(detect.effective_ceiling(), Duration::from_secs(300));
    }

    #[test]
    fn monitor_mode_aliases() {
        #[derive(Deserialize)]
        struct W {
            m: MonitorMode,
        }
        let w: W = toml::from_str("m = \"both\"").unwrap();
        assert_eq!(w.m, MonitorMode::LiveAndPoll);
        let w: W = toml::from_str("m = \"poll_only\"").unwrap();
        assert!(w.m.polls() && !w.m.listens());
    }

    #[test]
    fn profile_dir_defaults_under_profile_root() {
        let mut cfg = DropwatchConfig::default();
        cfg.daemon.data_dir = PathBuf::from("/srv/dw");
        let actor = ActorConfig {
            label: "a@b c".into(),
            bot_token: "t".into(),
            proxy: None,
            profile_dir: None,
        };
        assert_eq!(cfg.profile_dir(&actor), PathBuf::from("/srv/dw/profiles/a_b_c"));
        assert_eq!(cfg.dump_dir(), PathBuf::from("/srv/dw/logs/dumps"));
    }

    #[test]
    fn notify_requires_token_and_chat() {
        let mut notify = NotifyConfig::default();
        assert!(!notify.is_active());
        notify.bot_token = Some("1:x".into());
        notify.chat_id = Some("42".into());
        assert!(notify.is_active());
        notify.enabled = false;
        assert!(!notify.is_active());
    }
}
