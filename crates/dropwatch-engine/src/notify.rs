// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget operator notifications.

use std::sync::Arc;

use dropwatch_core::NotificationSink;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Wraps an optional sink; every send runs on its own task so a slow sink
/// never stalls an actor.
#[derive(Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    on_error: bool,
}

impl Notifier {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>, on_error: bool) -> Self {
        Self { sink, on_error }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn success(&self, actor: &str, detail: &str) -> Option<JoinHandle<()>> {
        self.send(format!("✅ SUCCESS ({actor}): {detail}"))
    }

    /// Sent only when error notifications are switched on.
    pub fn error(&self, actor: &str, detail: &str) -> Option<JoinHandle<()>> {
        if !self.on_error {
            return None;
        }
        self.send(format!("❌ ERROR ({actor}): {detail}"))
    }

    fn send(&self, text: String) -> Option<JoinHandle<()>> {
        let sink = self.sink.clone()?;
        Some(tokio::spawn(async move {
            match sink.send(&text).await {
                Ok(()) => debug!("notification sent"),
                Err(e) => warn!(error = %e, "notification failed"),
            }
        }))
    }
}
