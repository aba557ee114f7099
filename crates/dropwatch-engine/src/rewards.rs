// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized success counter, persisted best-effort to `rewards.count`.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct RewardCounter {
    count: Arc<Mutex<u64>>,
    path: Option<PathBuf>,
}

impl RewardCounter {
    /// In-memory counter starting at zero.
    pub fn in_memory() -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
            path: None,
        }
    }

    /// Counter seeded from `path` when it holds a number.
    pub async fn load(path: PathBuf) -> Self {
        let initial = tokio::fs::read_to_string(&path)
            .await
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Self {
            count: Arc::new(Mutex::new(initial)),
            path: Some(path),
        }
    }

    /// Increments and persists. The lock is held across the write so two
    /// concurrent bumps can never persist out of order.
    pub async fn bump(&self) -> u64 {
        let mut count = self.count.lock().await;
        *count += 1;
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            if let Err(e) = tokio::fs::write(path, count.to_string()).await {
                warn!(path = %path.display(), error = %e, "failed to persist reward count");
            }
        }
        *count
    }

    pub async fn get(&self) -> u64 {
        *self.count.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_bumps_are_all_counted() {
        let counter = RewardCounter::in_memory();
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let c = counter.clone();
                tokio::spawn(async move { c.bump().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.get().await, 20);
    }

    #[tokio::test]
    async fn count_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewards.count");
        let counter = RewardCounter::load(path.clone()).await;
        assert_eq!(counter.bump().await, 1);
        assert_eq!(counter.bump().await, 2);

        let reloaded = RewardCounter::load(path).await;
        assert_eq!(reloaded.get().await, 2);
    }
}
