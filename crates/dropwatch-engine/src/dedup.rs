// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL-bounded dedup map and the bounded event bus in front of the resolver.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dropwatch_core::{PostKey, StatusCode};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::rows::RowStore;

/// Post keys seen during one generation, with their first-seen time.
#[derive(Debug)]
pub struct DedupMap {
    ttl: Duration,
    seen: HashMap<PostKey, Instant>,
}

impl DedupMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Evicts expired entries, then records `key` if it is new.
    ///
    /// Returns `true` only the first time a key is seen within the TTL.
    /// An entry inserted at `t` becomes eligible again at `t + ttl`.
    pub fn check_and_insert(&mut self, key: PostKey, now: Instant) -> bool {
        let ttl = self.ttl;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < ttl);
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A post accepted by the bus, waiting for the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusItem {
    pub key: PostKey,
    /// Actor whose listener or poll tick discovered the post.
    pub origin: String,
}

/// What happened to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Duplicate,
    /// New key, but the resolver queue was full.
    Dropped,
}

/// Deduplicating front door of the pipeline. One per generation.
pub struct DedupBus {
    seen: Mutex<DedupMap>,
    tx: mpsc::Sender<BusItem>,
    rows: RowStore,
}

impl DedupBus {
    /// Creates the bus and the resolver-side receiver.
    pub fn new(ttl: Duration, capacity: usize, rows: RowStore) -> (Self, mpsc::Receiver<BusItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            seen: Mutex::new(DedupMap::new(ttl)),
            tx,
            rows,
        };
        (bus, rx)
    }

    /// Offers a discovered post to the pipeline.
    ///
    /// A key is marked seen before it is queued, so a dropped submission is
    /// not retried by a later duplicate. `NEWMSG` is shown on the origin row
    /// only for accepted posts.
    pub fn submit(&self, key: PostKey, origin: &str) -> Submission {
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check_and_insert(key, Instant::now());
        if !fresh {
            debug!(%key, origin, "duplicate post ignored");
            return Submission::Duplicate;
        }

        let item = BusItem {
            key,
            origin: origin.to_string(),
        };
        match self.tx.try_send(item) {
            Ok(()) => {
                debug!(%key, origin, "post accepted");
                self.rows.update(
                    origin,
                    StatusCode::NewMessage,
                    &format!("id={}", key.msg_id),
                    "",
                );
                Submission::Accepted
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%key, origin, "bus full, post dropped");
                Submission::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%key, origin, "bus closed, post dropped");
                Submission::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> RowStore {
        RowStore::new([("alpha", ""), ("beta", "")], None)
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_reaccepted_exactly_at_ttl() {
        let ttl = Duration::from_secs(600);
        let mut map = DedupMap::new(ttl);
        let key = PostKey::new(10, 5);
        let t0 = Instant::now();
        assert!(map.check_and_insert(key, t0));
        assert!(!map.check_and_insert(key, t0 + ttl - Duration::from_millis(1)));
        assert!(map.check_and_insert(key, t0 + ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_other_expired_keys() {
        let mut map = DedupMap::new(Duration::from_secs(600));
        let t0 = Instant::now();
        map.check_and_insert(PostKey::new(1, 1), t0);
        map.check_and_insert(PostKey::new(1, 2), t0 + Duration::from_secs(300));
        assert_eq!(map.len(), 2);
        map.check_and_insert(PostKey::new(1, 3), t0 + Duration::from_secs(700));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn duplicates_reach_the_resolver_once() {
        let rows = rows();
        let (bus, mut rx) = DedupBus::new(Duration::from_secs(1800), 200, rows.clone());
        let key = PostKey::new(10, 5);
        assert_eq!(bus.submit(key, "alpha"), Submission::Accepted);
        assert_eq!(bus.submit(key, "beta"), Submission::Duplicate);
        assert_eq!(bus.submit(key, "alpha"), Submission::Duplicate);

        assert_eq!(rx.recv().await.unwrap().origin, "alpha");
        assert!(rx.try_recv().is_err());

        let alpha = rows.get("alpha").unwrap();
        assert_eq!(alpha.status, StatusCode::NewMessage);
        assert_eq!(alpha.detail, "id=5");
        assert_eq!(rows.status_of("beta"), Some(StatusCode::Waiting));
    }

    #[tokio::test]
    async fn overflow_drops_without_signal() {
        let rows = rows();
        let (bus, _rx) = DedupBus::new(Duration::from_secs(1800), 1, rows.clone());
        assert_eq!(bus.submit(PostKey::new(1, 1), "alpha"), Submission::Accepted);
        assert_eq!(bus.submit(PostKey::new(1, 2), "beta"), Submission::Dropped);
        assert_eq!(rows.status_of("beta"), Some(StatusCode::Waiting));
        // Marked seen even though it was dropped.
        assert_eq!(bus.submit(PostKey::new(1, 2), "beta"), Submission::Duplicate);
    }
}
