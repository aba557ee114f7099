// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notification sink capturing every sent text.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use dropwatch_core::{DropwatchError, NotificationSink};

/// Captures notifications; can be switched to fail every send.
#[derive(Clone, Default)]
pub struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send return a notification error (still captured).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    /// Wait until at least `n` texts were sent.
    pub async fn wait_for(&self, n: usize) -> Vec<String> {
        loop {
            let notified = self.notify.notified();
            {
                let sent = self.sent.lock().await;
                if sent.len() >= n {
                    return sent.clone();
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl NotificationSink for MockSink {
    async fn send(&self, text: &str) -> Result<(), DropwatchError> {
        self.sent.lock().await.push(text.to_string());
        self.notify.notify_waiters();
        if self.failing.load(Ordering::SeqCst) {
            return Err(DropwatchError::Notify {
                message: "mock sink failure".into(),
            });
        }
        Ok(())
    }
}
