// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal presenter for the status table.
//!
//! The rich presenter redraws the whole table whenever a row or the poll
//! overlay changes. It runs supervised: if it panics, the panic text goes to
//! `<logs_dir>/ui_crash.log` and the plain presenter takes over, printing
//! one line per row change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dropwatch_core::{RowState, StatusCode};
use dropwatch_engine::{PollOverlay, RowStore};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub const CRASH_LOG: &str = "ui_crash.log";

const REFRESH: Duration = Duration::from_millis(500);
const DETAIL_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterMode {
    Rich { color: bool },
    Plain,
}

/// Starts the presenter for `rows` until `cancel` fires.
pub fn spawn_presenter(
    rows: RowStore,
    logs_dir: PathBuf,
    mode: PresenterMode,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    match mode {
        PresenterMode::Plain => tokio::spawn(plain_loop(rows, cancel)),
        PresenterMode::Rich { color } => {
            let rich = rich_loop(rows.clone(), color, cancel.clone());
            supervise(rich, rows, logs_dir, cancel)
        }
    }
}

/// Runs `rich`; after a panic, records it and falls back to plain output.
pub fn supervise<F>(
    rich: F,
    rows: RowStore,
    logs_dir: PathBuf,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::spawn(rich).await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                let text = panic_text(e.into_panic());
                error!(panic = %text, "presenter crashed, falling back to plain output");
                if let Err(e) = write_crash_log(&logs_dir, &text).await {
                    warn!(error = %e, "failed to write presenter crash log");
                }
                plain_loop(rows, cancel).await;
            }
            Err(_) => {}
        }
    })
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast::<&'static str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "unknown panic".to_string()),
    }
}

async fn write_crash_log(logs_dir: &Path, text: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(logs_dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(CRASH_LOG))
        .await?;
    let line = format!(
        "{} presenter panicked: {}\n",
        chrono::Local::now().to_rfc3339(),
        text.replace('\n', " ")
    );
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

async fn rich_loop(rows: RowStore, color: bool, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(REFRESH);
    let mut last = String::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let overlay = rows.poll_overlay();
        let table = render_table(&rows.snapshot(), overlay.as_ref(), Instant::now(), color);
        if table != last {
            if color {
                // Clear screen, cursor home.
                print!("\x1b[2J\x1b[H");
            }
            println!("{table}");
            last = table;
        }
    }
}

async fn plain_loop(rows: RowStore, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(REFRESH);
    let mut seen: HashMap<String, (StatusCode, String, String)> = HashMap::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        for line in changed_lines(&rows.snapshot(), &mut seen) {
            println!("{line}");
        }
    }
}

/// One line per row whose status, detail or ticket changed since the last call.
pub fn changed_lines(
    rows: &[RowState],
    seen: &mut HashMap<String, (StatusCode, String, String)>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for row in rows {
        let current = (row.status, row.detail.clone(), row.ticket.clone());
        if seen.get(&row.actor) == Some(&current) {
            continue;
        }
        let mut line = format!("{} {} {}", timestamp(row.updated_ms), row.actor, row.status);
        if !row.ticket.is_empty() {
            line.push_str(&format!(" [{}]", row.ticket));
        }
        if !row.detail.is_empty() {
            line.push_str(&format!(" {}", row.detail));
        }
        lines.push(line);
        seen.insert(row.actor.clone(), current);
    }
    lines
}

fn timestamp(updated_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(updated_ms)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Renders the full table. A row sitting in `MONITORING` while the poll
/// overlay is active for it shows as `POLL`.
pub fn render_table(
    rows: &[RowState],
    overlay: Option<&PollOverlay>,
    now: Instant,
    color: bool,
) -> String {
    let mut out = format!(
        "  {:<12} {:<26} {:<22} {:<12} {}\n",
        "ACTOR", "PROXY", "STATUS", "TICKET", "DETAIL"
    );
    for row in rows {
        let polling = row.status == StatusCode::Monitoring
            && overlay.is_some_and(|o| o.is_active_for(&row.actor, now));
        let status = if polling { StatusCode::Poll } else { row.status };
        let label = status.label(&row.detail);
        let detail = if embeds_detail(status) {
            String::new()
        } else {
            truncate(&row.detail, DETAIL_WIDTH)
        };
        let proxy = if row.proxy.is_empty() { "direct" } else { &row.proxy };
        let label = pad(&label, 22);
        let label = if color { paint(status, &label) } else { label };
        out.push_str(&format!(
            "  {:<12} {:<26} {} {:<12} {}\n",
            row.actor, proxy, label, row.ticket, detail
        ));
    }
    out
}

fn embeds_detail(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::Delay | StatusCode::ProxyTgr | StatusCode::ProxyWebr
    )
}

fn paint(status: StatusCode, label: &str) -> String {
    use colored::Colorize;
    match status {
        StatusCode::Success | StatusCode::Joined => label.green().bold().to_string(),
        StatusCode::Error
        | StatusCode::Fail
        | StatusCode::ProxyTgr
        | StatusCode::ProxyWebr
        | StatusCode::JoinFail => label.red().to_string(),
        StatusCode::Missed
        | StatusCode::Timeout
        | StatusCode::Skip
        | StatusCode::BadLink
        | StatusCode::NoLink
        | StatusCode::NoAccess => label.yellow().to_string(),
        StatusCode::Monitoring | StatusCode::Poll => label.cyan().to_string(),
        StatusCode::Stopped | StatusCode::Paused => label.dimmed().to_string(),
        _ => label.to_string(),
    }
}

// Width in chars; emoji widths vary by terminal anyway.
fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.to_string()
    } else {
        format!("{s}{}", " ".repeat(width - len))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
