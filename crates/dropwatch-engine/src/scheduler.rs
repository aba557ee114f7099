// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Round-robin poll and keepalive loops.
//!
//! Each tick picks the next actor in configuration order, makes one cheap
//! remote call through it and sleeps for the rest of the interval. Actors
//! that are not ready yet still use up their tick, so the aggregate call
//! rate on the shared source never rises above one call per interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::dedup::{DedupBus, Submission};
use crate::registry::RuntimeRegistry;
use crate::rows::RowStore;

/// With `N` actors each one polls at most once per this period.
pub const POLL_RATE_FLOOR: Duration = Duration::from_secs(10);

/// Minimum time the poll overlay stays visible.
const MIN_OVERLAY_HOLD: Duration = Duration::from_millis(850);

/// Raises `base` to at least `10s / actors`.
pub fn effective_poll_interval(base: Duration, actors: usize) -> Duration {
    if actors == 0 {
        return base;
    }
    let floor = POLL_RATE_FLOOR / u32::try_from(actors).unwrap_or(u32::MAX);
    base.max(floor)
}

async fn sleep_rest(started: Instant, interval: Duration) {
    tokio::time::sleep_until(started + interval).await;
}

/// Staggered "latest post" checks feeding the bus.
pub struct PollScheduler {
    actors: Vec<String>,
    registry: RuntimeRegistry,
    bus: Arc<DedupBus>,
    rows: RowStore,
    interval: Duration,
    next: usize,
    last_seen: Option<i64>,
}

impl PollScheduler {
    /// `base` is the configured interval; the rate floor is applied here.
    pub fn new(
        actors: Vec<String>,
        registry: RuntimeRegistry,
        bus: Arc<DedupBus>,
        rows: RowStore,
        base: Duration,
    ) -> Self {
        let interval = effective_poll_interval(base, actors.len());
        Self {
            actors,
            registry,
            bus,
            rows,
            interval,
            next: 0,
            last_seen: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Newest message id seen so far.
    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    fn next_actor(&mut self) -> Option<String> {
        if self.actors.is_empty() {
            return None;
        }
        let label = self.actors[self.next % self.actors.len()].clone();
        self.next = self.next.wrapping_add(1);
        Some(label)
    }

    /// Records the current newest id without emitting it.
    ///
    /// Tries up to two passes over the actor list.
    pub async fn establish_baseline(&mut self) {
        for _ in 0..self.actors.len() * 2 {
            let Some(label) = self.next_actor() else {
                return;
            };
            let Some(runtime) = self.registry.get(&label) else {
                continue;
            };
            match runtime.source.fetch_latest(&runtime.channel, 1).await {
                Ok(posts) => {
                    if let Some(post) = posts.first() {
                        self.last_seen = Some(post.key.msg_id);
                        info!(actor = %label, msg_id = post.key.msg_id, "poll baseline set");
                        return;
                    }
                }
                Err(e) => debug!(actor = %label, error = %e, "baseline fetch failed"),
            }
        }
    }

    /// One poll tick: pick the next actor and check the newest post.
    ///
    /// Returns the bus verdict when a newer post was submitted.
    pub async fn tick(&mut self) -> Option<Submission> {
        let label = self.next_actor()?;
        self.rows
            .set_poll_overlay(&label, MIN_OVERLAY_HOLD.max(self.interval.mul_f64(0.9)));

        let runtime = self.registry.get(&label)?;
        let posts = match runtime.source.fetch_latest(&runtime.channel, 1).await {
            Ok(posts) => posts,
            Err(e) => {
                debug!(actor = %label, error = %e, "poll fetch failed");
                return None;
            }
        };
        let post = posts.into_iter().next()?;
        let msg_id = post.key.msg_id;
        match self.last_seen {
            None => {
                self.last_seen = Some(msg_id);
                None
            }
            Some(seen) if msg_id > seen => {
                self.last_seen = Some(msg_id);
                debug!(actor = %label, msg_id, "poll found a newer post");
                Some(self.bus.submit(post.key, &label))
            }
            Some(_) => {
                trace!(actor = %label, msg_id, "no new post");
                None
            }
        }
    }

    /// Waits for the first ready actor, sets the baseline, then polls forever.
    pub async fn run(mut self) {
        self.registry.wait_any_ready().await;
        self.establish_baseline().await;
        info!(interval_ms = self.interval.as_millis() as u64, "poll scheduler running");
        loop {
            let started = Instant::now();
            self.tick().await;
            sleep_rest(started, self.interval).await;
        }
    }
}

/// Staggered liveness pings that keep transport sessions warm.
pub struct KeepaliveScheduler {
    actors: Vec<String>,
    registry: RuntimeRegistry,
    interval: Duration,
    next: usize,
}

impl KeepaliveScheduler {
    pub fn new(actors: Vec<String>, registry: RuntimeRegistry, interval: Duration) -> Self {
        Self {
            actors,
            registry,
            interval,
            next: 0,
        }
    }

    /// Pings the next actor if it is ready. Returns whether a ping went out.
    pub async fn tick(&mut self) -> bool {
        if self.actors.is_empty() {
            return false;
        }
        let label = &self.actors[self.next % self.actors.len()];
        self.next = self.next.wrapping_add(1);
        let Some(runtime) = self.registry.get(label) else {
            return false;
        };
        if let Err(e) = runtime.source.ping().await {
            debug!(actor = %label, error = %e, "keepalive ping failed");
        }
        true
    }

    pub async fn run(mut self) {
        debug!(interval_ms = self.interval.as_millis() as u64, "keepalive running");
        loop {
            let started = Instant::now();
            self.tick().await;
            sleep_rest(started, self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_actors_raise_interval_to_a_third_of_ten_seconds() {
        let effective = effective_poll_interval(Duration::from_secs(1), 3);
        assert_eq!(effective, Duration::from_secs(10) / 3);
    }

    #[test]
    fn slow_interval_is_kept() {
        assert_eq!(
            effective_poll_interval(Duration::from_secs(12), 2),
            Duration::from_secs(12)
        );
        assert_eq!(
            effective_poll_interval(Duration::from_millis(500), 0),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn single_actor_floor_is_ten_seconds() {
        assert_eq!(
            effective_poll_interval(Duration::from_secs(1), 1),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn tick_without_ready_actor_sets_overlay_only() {
        let rows = RowStore::new([("alpha", ""), ("beta", "")], None);
        let (bus, _rx) = DedupBus::new(Duration::from_secs(600), 4, rows.clone());
        let mut poller = PollScheduler::new(
            vec!["alpha".into(), "beta".into()],
            RuntimeRegistry::new(),
            Arc::new(bus),
            rows.clone(),
            Duration::from_secs(1),
        );
        assert_eq!(poller.tick().await, None);
        let overlay = rows.poll_overlay().expect("overlay set");
        assert_eq!(overlay.actor, "alpha");
        poller.tick().await;
        assert_eq!(rows.poll_overlay().map(|o| o.actor).as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn keepalive_skips_unready_actors() {
        let mut keepalive = KeepaliveScheduler::new(
            vec!["alpha".into()],
            RuntimeRegistry::new(),
            Duration::from_secs(1),
        );
        assert!(!keepalive.tick().await);
        let mut empty = KeepaliveScheduler::new(Vec::new(), RuntimeRegistry::new(), Duration::from_secs(1));
        assert!(!empty.tick().await);
    }
}
