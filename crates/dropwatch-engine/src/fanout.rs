// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-to-many delivery of resolved links to every actor's open queue.

use std::sync::{Arc, Mutex, PoisonError};

use dropwatch_core::PostKey;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A resolved link as delivered to one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenItem {
    pub url: String,
    pub ticket: Option<String>,
    pub key: PostKey,
}

/// Registered actor lanes. Each lane is an independent bounded queue.
#[derive(Clone, Default)]
pub struct Fanout {
    lanes: Arc<Mutex<Vec<(String, mpsc::Sender<OpenItem>)>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the lane of `actor`.
    pub fn register(&self, actor: &str, tx: mpsc::Sender<OpenItem>) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.retain(|(label, _)| label != actor);
        lanes.push((actor.to_string(), tx));
    }

    pub fn unregister(&self, actor: &str) {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(label, _)| label != actor);
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Pushes `item` onto every lane without waiting.
    ///
    /// A full lane skips this item for that actor only. Returns the number
    /// of lanes that accepted it.
    pub fn fanout(&self, item: &OpenItem) -> usize {
        let lanes = self
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut delivered = 0;
        for (actor, tx) in &lanes {
            match tx.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(actor = %actor, key = %item.key, "open queue full, item skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(actor = %actor, key = %item.key, "open queue closed");
                }
            }
        }
        debug!(key = %item.key, delivered, lanes = lanes.len(), "fanout");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(msg_id: i64) -> OpenItem {
        OpenItem {
            url: "https://t.me/bot/app?startapp=1".into(),
            ticket: None,
            key: PostKey::new(10, msg_id),
        }
    }

    #[tokio::test]
    async fn every_lane_gets_the_item() {
        let fanout = Fanout::new();
        let (tx_a, mut rx_a) = mpsc::channel(25);
        let (tx_b, mut rx_b) = mpsc::channel(25);
        fanout.register("alpha", tx_a);
        fanout.register("beta", tx_b);
        assert_eq!(fanout.fanout(&item(1)), 2);
        assert_eq!(rx_a.recv().await.unwrap().key, PostKey::new(10, 1));
        assert_eq!(rx_b.recv().await.unwrap().key, PostKey::new(10, 1));
    }

    #[tokio::test]
    async fn full_lane_does_not_block_others() {
        let fanout = Fanout::new();
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(25);
        fanout.register("alpha", tx_a);
        fanout.register("beta", tx_b);
        assert_eq!(fanout.fanout(&item(1)), 2);
        assert_eq!(fanout.fanout(&item(2)), 1);
        assert_eq!(rx_b.recv().await.unwrap().key.msg_id, 1);
        assert_eq!(rx_b.recv().await.unwrap().key.msg_id, 2);
    }

    #[test]
    fn reregister_replaces_lane() {
        let fanout = Fanout::new();
        let (tx, _rx) = mpsc::channel(1);
        fanout.register("alpha", tx.clone());
        fanout.register("alpha", tx);
        assert_eq!(fanout.lane_count(), 1);
        fanout.unregister("alpha");
        assert_eq!(fanout.lane_count(), 0);
    }
}
