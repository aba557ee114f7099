// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only `status_live.tsv` writer.
//!
//! Exactly one background task owns the file. Row updates are pushed onto
//! an unbounded queue and the writer drains it in order, so the file never
//! sees two writers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use dropwatch_core::RowState;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Column header written once to an empty file.
pub const HEADER: &str = "ts\tactor\tstatus\tticket\tdetail\n";

/// File name under `<data_dir>/logs/`.
pub const FILE_NAME: &str = "status_live.tsv";

/// One queued log line.
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub ts: DateTime<Local>,
    pub actor: String,
    pub status: String,
    pub ticket: String,
    pub detail: String,
}

impl StatusLine {
    pub fn from_row(row: &RowState) -> Self {
        Self {
            ts: Local::now(),
            actor: row.actor.clone(),
            status: row.status.to_string(),
            ticket: row.ticket.clone(),
            detail: row.detail.clone(),
        }
    }

    /// Tab-separated line with embedded newlines flattened.
    pub fn format(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\n",
            self.ts.format("%Y-%m-%d %H:%M:%S"),
            flatten(&self.actor),
            self.status,
            flatten(&self.ticket),
            flatten(&self.detail),
        )
    }
}

fn flatten(s: &str) -> String {
    s.replace(['\n', '\r', '\t'], " ")
}

/// Sending side of the live log. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct StatusLogHandle {
    tx: mpsc::UnboundedSender<StatusLine>,
}

impl StatusLogHandle {
    /// Queues a row snapshot. Never blocks; dropped silently once the
    /// writer has shut down.
    pub fn append(&self, row: &RowState) {
        let _ = self.tx.send(StatusLine::from_row(row));
    }
}

/// Spawner for the single writer task.
pub struct StatusLog;

impl StatusLog {
    /// Spawns the writer for `path`. The task ends once every handle is dropped.
    pub fn spawn(path: PathBuf) -> (StatusLogHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(path, rx));
        (StatusLogHandle { tx }, task)
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::UnboundedReceiver<StatusLine>) {
    let mut file = match open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "status log unavailable, draining without writing");
            while rx.recv().await.is_some() {}
            return;
        }
    };

    while let Some(line) = rx.recv().await {
        let text = line.format();
        if let Err(e) = file.write_all(text.as_bytes()).await {
            warn!(error = %e, "status log write failed");
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!(error = %e, "status log flush failed");
        }
    }
    debug!(path = %path.display(), "status log writer stopped");
}

async fn open(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    if file.metadata().await?.len() == 0 {
        file.write_all(HEADER.as_bytes()).await?;
        file.flush().await?;
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dropwatch_core::StatusCode;

    fn row(detail: &str) -> RowState {
        RowState {
            actor: "alpha".into(),
            proxy: String::new(),
            status: StatusCode::NewMessage,
            detail: detail.into(),
            ticket: "$50".into(),
            updated_ms: 0,
        }
    }

    #[test]
    fn line_flattens_newlines() {
        let mut line = StatusLine::from_row(&row("first\nsecond\r\nthird"));
        line.ts = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            line.format(),
            "2026-03-04 05:06:07\talpha\tNEWMSG\t$50\tfirst second  third\n"
        );
    }

    #[tokio::test]
    async fn writer_adds_header_once_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(FILE_NAME);

        let (handle, task) = StatusLog::spawn(path.clone());
        handle.append(&row("id=1"));
        drop(handle);
        task.await.unwrap();

        let (handle, task) = StatusLog::spawn(path.clone());
        handle.append(&row("id=2"));
        drop(handle);
        task.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.trim_end());
        assert!(lines[1].ends_with("\tid=1"));
        assert!(lines[2].ends_with("\tid=2"));
    }
}
