// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dropwatch check` command implementation.
//!
//! Prints the resolved configuration that `serve` would run with. Proxy
//! credentials are masked.

use std::io::IsTerminal;

use dropwatch_config::{DropwatchConfig, ProxySpec, WatchMode};

/// Run the `dropwatch check` command. Only reached with a valid config.
pub fn run_check(config: &DropwatchConfig) {
    let use_color = std::io::stdout().is_terminal();
    print!("{}", render_summary(config, use_color));
}

pub fn render_summary(config: &DropwatchConfig, use_color: bool) -> String {
    let mut out = String::new();
    let ok = if use_color {
        use colored::Colorize;
        "✓".green().to_string()
    } else {
        "[OK]".to_string()
    };

    out.push('\n');
    out.push_str(&format!("  {ok} configuration valid\n"));
    out.push_str(&format!("  {}\n", "-".repeat(50)));
    match config.watch.mode {
        WatchMode::Live => out.push_str(&format!(
            "    {:<14} {} ({})\n",
            "channel",
            config.watch.channel,
            monitor_name(config)
        )),
        WatchMode::Replay => out.push_str(&format!(
            "    {:<14} {}\n",
            "replay",
            config.watch.replay_link.as_deref().unwrap_or_default()
        )),
    }
    out.push_str(&format!(
        "    {:<14} {}\n",
        "browser",
        if config.browser.headless { "headless" } else { "headed" }
    ));
    out.push_str(&format!(
        "    {:<14} {}\n",
        "notify",
        if config.notify.is_active() { "on" } else { "off" }
    ));
    out.push_str(&format!(
        "    {:<14} {}\n",
        "data dir",
        config.daemon.data_dir.display()
    ));
    out.push_str(&format!("    {:<14} {}\n", "actors", config.actors.len()));
    for actor in &config.actors {
        let proxy = actor
            .proxy
            .as_deref()
            .and_then(|raw| ProxySpec::parse(raw).ok().flatten())
            .map(|p| p.display_masked())
            .unwrap_or_else(|| "direct".to_string());
        out.push_str(&format!("      - {:<12} {proxy}\n", actor.label));
    }
    out.push('\n');
    out
}

fn monitor_name(config: &DropwatchConfig) -> &'static str {
    match (config.watch.monitor.listens(), config.watch.monitor.polls()) {
        (true, true) => "live+poll",
        (true, false) => "live only",
        _ => "poll only",
    }
}
