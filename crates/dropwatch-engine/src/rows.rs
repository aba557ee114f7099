// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-actor status table.
//!
//! The [`RowStore`] is the only place row state changes. Every mutating
//! entry point goes through one lock, so updates from the listener, the
//! resolver and the open workers never interleave halfway. Logged updates
//! are forwarded to the [`StatusLogHandle`] writer.
//!
//! While frozen (after a pause) every mutation is ignored until [`RowStore::thaw`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dropwatch_core::{RowState, StatusCode};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::status_log::StatusLogHandle;

/// "This actor is polling right now" hint for presenters.
///
/// Written once per poll tick by the scheduler; never stored in a row so
/// it cannot overwrite a persistent status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOverlay {
    pub actor: String,
    pub until: Instant,
}

impl PollOverlay {
    pub fn is_active_for(&self, actor: &str, now: Instant) -> bool {
        self.actor == actor && now < self.until
    }
}

#[derive(Debug, Default)]
struct RowTable {
    rows: Vec<RowState>,
    frozen: bool,
}

impl RowTable {
    fn find_mut(&mut self, actor: &str) -> Option<&mut RowState> {
        self.rows.iter_mut().find(|r| r.actor == actor)
    }
}

/// Shared handle to the status table. Cloning is cheap.
#[derive(Clone)]
pub struct RowStore {
    table: Arc<Mutex<RowTable>>,
    log: Option<StatusLogHandle>,
    overlay: Arc<watch::Sender<Option<PollOverlay>>>,
}

impl RowStore {
    /// Creates one `WAITING` row per `(actor, proxy display)` pair, in order.
    pub fn new<I, A, P>(actors: I, log: Option<StatusLogHandle>) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        let now = now_ms();
        let rows = actors
            .into_iter()
            .map(|(actor, proxy)| RowState {
                actor: actor.into(),
                proxy: proxy.into(),
                status: StatusCode::Waiting,
                detail: String::new(),
                ticket: String::new(),
                updated_ms: now,
            })
            .collect();
        let (overlay, _) = watch::channel(None);
        Self {
            table: Arc::new(Mutex::new(RowTable {
                rows,
                frozen: false,
            })),
            log,
            overlay: Arc::new(overlay),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RowTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates one row and appends the change to the live log.
    ///
    /// The ticket is only replaced when `ticket` is non-empty, so a later
    /// status without a label keeps the one already shown.
    /// Returns `false` when the store is frozen or the actor is unknown.
    pub fn update(&self, actor: &str, status: StatusCode, detail: &str, ticket: &str) -> bool {
        let logged = {
            let mut table = self.lock();
            if table.frozen {
                trace!(actor, %status, "row update ignored while frozen");
                return false;
            }
            let Some(row) = table.find_mut(actor) else {
                debug!(actor, %status, "row update for unknown actor");
                return false;
            };
            apply(row, status, detail, ticket);
            row.clone()
        };
        if let Some(log) = &self.log {
            log.append(&logged);
        }
        true
    }

    /// Like [`update`](Self::update) but not written to the live log.
    pub fn update_quiet(&self, actor: &str, status: StatusCode, detail: &str) -> bool {
        let mut table = self.lock();
        if table.frozen {
            return false;
        }
        match table.find_mut(actor) {
            Some(row) => {
                apply(row, status, detail, "");
                true
            }
            None => false,
        }
    }

    /// Sets every row to `status` with `detail`. Not logged.
    pub fn set_all(&self, status: StatusCode, detail: &str) {
        let mut table = self.lock();
        if table.frozen {
            return;
        }
        for row in &mut table.rows {
            apply(row, status, detail, "");
        }
    }

    /// Replaces the status only if the row still shows `expect`.
    ///
    /// Used by cool-down tasks so a newer outcome is never clobbered.
    pub fn set_if(&self, actor: &str, expect: StatusCode, status: StatusCode) -> bool {
        let mut table = self.lock();
        if table.frozen {
            return false;
        }
        match table.find_mut(actor) {
            Some(row) if row.status == expect => {
                apply(row, status, "", "");
                true
            }
            _ => false,
        }
    }

    /// Stops all mutation until [`thaw`](Self::thaw).
    pub fn freeze(&self) {
        self.lock().frozen = true;
    }

    pub fn thaw(&self) {
        self.lock().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    /// Copy of every row, in configuration order.
    pub fn snapshot(&self) -> Vec<RowState> {
        self.lock().rows.clone()
    }

    pub fn get(&self, actor: &str) -> Option<RowState> {
        self.lock().rows.iter().find(|r| r.actor == actor).cloned()
    }

    pub fn status_of(&self, actor: &str) -> Option<StatusCode> {
        self.get(actor).map(|r| r.status)
    }

    /// Marks `actor` as the one polling right now, for `hold`.
    pub fn set_poll_overlay(&self, actor: &str, hold: Duration) {
        self.overlay.send_replace(Some(PollOverlay {
            actor: actor.to_string(),
            until: Instant::now() + hold,
        }));
    }

    pub fn clear_poll_overlay(&self) {
        self.overlay.send_replace(None);
    }

    pub fn poll_overlay(&self) -> Option<PollOverlay> {
        self.overlay.borrow().clone()
    }

    /// Receiver that observes every overlay change.
    pub fn watch_poll_overlay(&self) -> watch::Receiver<Option<PollOverlay>> {
        self.overlay.subscribe()
    }
}

fn apply(row: &mut RowState, status: StatusCode, detail: &str, ticket: &str) {
    row.status = status;
    row.detail = detail.to_string();
    if !ticket.trim().is_empty() {
        row.ticket = ticket.to_string();
    }
    row.updated_ms = now_ms();
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RowStore {
        RowStore::new([("alpha", ""), ("beta", "10.0.0.1:8080")], None)
    }

    #[test]
    fn rows_start_waiting_in_order() {
        let rows = store().snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].actor, "alpha");
        assert_eq!(rows[1].proxy, "10.0.0.1:8080");
        assert!(rows.iter().all(|r| r.status == StatusCode::Waiting));
    }

    #[test]
    fn ticket_is_kept_when_update_has_none() {
        let rows = store();
        assert!(rows.update("alpha", StatusCode::Post, "id=5", "$50"));
        assert!(rows.update("alpha", StatusCode::Opening, "", ""));
        let row = rows.get("alpha").unwrap();
        assert_eq!(row.status, StatusCode::Opening);
        assert_eq!(row.ticket, "$50");
        assert_eq!(row.detail, "");
    }

    #[test]
    fn unknown_actor_is_rejected() {
        assert!(!store().update("gamma", StatusCode::Error, "x", ""));
    }

    #[test]
    fn frozen_store_ignores_every_mutation() {
        let rows = store();
        rows.set_all(StatusCode::Stopped, "");
        rows.freeze();
        assert!(!rows.update("alpha", StatusCode::Success, "late", ""));
        assert!(!rows.update_quiet("alpha", StatusCode::Success, "late"));
        assert!(!rows.set_if("alpha", StatusCode::Stopped, StatusCode::Monitoring));
        rows.set_all(StatusCode::Monitoring, "");
        assert!(rows.snapshot().iter().all(|r| r.status == StatusCode::Stopped));

        rows.thaw();
        assert!(rows.update("alpha", StatusCode::Monitoring, "", ""));
    }

    #[test]
    fn set_if_only_reverts_the_expected_status() {
        let rows = store();
        rows.update("alpha", StatusCode::NoLink, "no miniapp link", "");
        rows.update("alpha", StatusCode::Opening, "", "");
        assert!(!rows.set_if("alpha", StatusCode::NoLink, StatusCode::Monitoring));
        assert_eq!(rows.status_of("alpha"), Some(StatusCode::Opening));

        rows.update("beta", StatusCode::BadLink, "not tg link", "");
        assert!(rows.set_if("beta", StatusCode::BadLink, StatusCode::Monitoring));
        assert_eq!(rows.status_of("beta"), Some(StatusCode::Monitoring));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_overlay_expires() {
        let rows = store();
        rows.set_poll_overlay("beta", Duration::from_millis(850));
        let overlay = rows.poll_overlay().unwrap();
        assert!(overlay.is_active_for("beta", Instant::now()));
        assert!(!overlay.is_active_for("alpha", Instant::now()));
        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(!overlay.is_active_for("beta", Instant::now()));
    }
}
