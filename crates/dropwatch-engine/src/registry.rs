// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Actors that finished startup and can serve poll, keepalive and resolve calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dropwatch_core::{ChannelHandle, MessagingSource};
use tokio::sync::Notify;

/// A connected actor with its resolved channel.
#[derive(Clone)]
pub struct ActorRuntime {
    pub label: String,
    pub source: Arc<dyn MessagingSource>,
    pub channel: ChannelHandle,
}

/// Ready actors of the current generation.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: Arc<Mutex<HashMap<String, ActorRuntime>>>,
    ready: Arc<Notify>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActorRuntime>> {
        self.runtimes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, runtime: ActorRuntime) {
        self.lock().insert(runtime.label.clone(), runtime);
        self.ready.notify_waiters();
    }

    pub fn unregister(&self, label: &str) {
        self.lock().remove(label);
    }

    pub fn get(&self, label: &str) -> Option<ActorRuntime> {
        self.lock().get(label).cloned()
    }

    /// Any ready actor, preferring `label`.
    pub fn get_or_any(&self, label: &str) -> Option<ActorRuntime> {
        let runtimes = self.lock();
        runtimes
            .get(label)
            .or_else(|| runtimes.values().next())
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Resolves once at least one actor is registered.
    pub async fn wait_any_ready(&self) {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
