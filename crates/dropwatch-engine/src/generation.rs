// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run generations: the scope every pipeline task is spawned into.
//!
//! A [`Generation`] pairs a [`CancellationToken`] with a [`TaskTracker`].
//! Cancelling it stops every task it spawned, cool-down timers included,
//! and [`Generation::shutdown`] waits until they are all gone.

use std::future::Future;
use std::time::Duration;

use dropwatch_core::StatusCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::rows::RowStore;

/// Pause between restarts of a supervised loop.
pub const SUPERVISOR_RESTART_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct Generation {
    id: u64,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Generation {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawns `fut`; it is dropped at its next await point once the
    /// generation is cancelled.
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let id = self.id;
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!(generation = id, task = name, "task cancelled"),
                _ = fut => debug!(generation = id, task = name, "task finished"),
            }
        });
    }

    /// Spawns a task that watches the generation token itself, so it can
    /// clean up before returning. [`shutdown`](Self::shutdown) still waits for it.
    pub fn spawn_graceful<F, Fut>(&self, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(make(self.cancel.clone()));
    }

    /// Runs the loop built by `factory`, restarting it after a panic.
    ///
    /// A normal return ends supervision.
    pub fn spawn_supervised<F, Fut>(&self, name: &'static str, factory: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();
        let id = self.id;
        self.tracker.spawn(async move {
            loop {
                let token = cancel.clone();
                let run = factory();
                let inner = tracker.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = run => {}
                    }
                });
                match inner.await {
                    Ok(()) => {
                        debug!(generation = id, task = name, "supervised loop ended");
                        return;
                    }
                    Err(e) if e.is_panic() => {
                        error!(generation = id, task = name, "supervised loop panicked, restarting");
                    }
                    Err(_) => return,
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(SUPERVISOR_RESTART_DELAY) => {}
                }
            }
        });
    }

    /// Reverts `actor` from `expect` to `next` after `after`, unless the
    /// row changed meanwhile or the generation is cancelled first.
    pub fn spawn_cooldown(
        &self,
        rows: &RowStore,
        actor: &str,
        after: Duration,
        expect: StatusCode,
        next: StatusCode,
    ) {
        let rows = rows.clone();
        let actor = actor.to_string();
        self.spawn("cooldown", async move {
            tokio::time::sleep(after).await;
            if rows.set_if(&actor, expect, next) {
                debug!(actor = %actor, from = %expect, to = %next, "cool-down elapsed");
            }
        });
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the generation and waits for every task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(generation = self.id, "generation stopped");
    }

    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_cooldowns() {
        let rows = RowStore::new([("alpha", "")], None);
        rows.update("alpha", StatusCode::BadLink, "not tg link", "");
        let generation = Generation::new(1);
        generation.spawn_cooldown(
            &rows,
            "alpha",
            Duration::from_secs(120),
            StatusCode::BadLink,
            StatusCode::Monitoring,
        );
        generation.shutdown().await;
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(rows.status_of("alpha"), Some(StatusCode::BadLink));
        assert_eq!(generation.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_reverts_after_delay() {
        let rows = RowStore::new([("alpha", "")], None);
        rows.update("alpha", StatusCode::NoLink, "no miniapp link", "");
        let generation = Generation::new(1);
        generation.spawn_cooldown(
            &rows,
            "alpha",
            Duration::from_secs(10),
            StatusCode::NoLink,
            StatusCode::Monitoring,
        );
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(rows.status_of("alpha"), Some(StatusCode::NoLink));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rows.status_of("alpha"), Some(StatusCode::Monitoring));
    }

    #[tokio::test(start_paused = true)]
    async fn supervised_loop_restarts_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));
        let generation = Generation::new(7);
        let counter = runs.clone();
        generation.spawn_supervised("flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("boom");
                }
            }
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        generation.shutdown().await;
    }

    #[tokio::test]
    async fn graceful_task_sees_the_token() {
        let generation = Generation::new(2);
        let cleaned = Arc::new(AtomicUsize::new(0));
        let flag = cleaned.clone();
        generation.spawn_graceful(move |token| async move {
            token.cancelled().await;
            flag.store(1, Ordering::SeqCst);
        });
        generation.shutdown().await;
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }
}
