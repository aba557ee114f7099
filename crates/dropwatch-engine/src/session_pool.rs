// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warm browser sessions, one per actor, reused across opens.
//!
//! The pool outlives run generations: a pause keeps the browser warm and
//! only quit closes it. Once closed, the pool never launches a browser again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dropwatch_core::{
    BrowserSession, BrowserSurface, DropwatchError, SessionOptions, StorageState, WaitPolicy,
};
use tracing::{debug, info, warn};

use crate::generation::Generation;

/// Shared handle to one actor's warm session.
pub type SharedSession = Arc<tokio::sync::Mutex<WarmSession>>;

/// A lazily launched browser session with one automatic restart.
pub struct WarmSession {
    label: String,
    surface: Arc<dyn BrowserSurface>,
    options: SessionOptions,
    wait: WaitPolicy,
    session: Option<Box<dyn BrowserSession>>,
    state_saved: bool,
    /// Set by [`WarmSessionPool::close_all`].
    pool_closed: Arc<AtomicBool>,
}

impl WarmSession {
    pub fn new(
        label: impl Into<String>,
        surface: Arc<dyn BrowserSurface>,
        options: SessionOptions,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            surface,
            options,
            wait,
            session: None,
            state_saved: false,
            pool_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Launches the browser (if needed) and parks it on `about:blank`.
    pub async fn start(&mut self) -> Result<(), DropwatchError> {
        if self.pool_closed.load(Ordering::SeqCst) {
            return Err(DropwatchError::browser("session pool closed"));
        }
        if self.session.as_ref().is_some_and(|s| !s.is_closed()) {
            return Ok(());
        }
        self.session = None;
        let mut session = self.surface.open_session(self.options.clone()).await?;
        if let Err(e) = session.navigate("about:blank", WaitPolicy::Commit).await {
            debug!(actor = %self.label, error = %e, "about:blank failed on warm start");
        }
        info!(actor = %self.label, headless = self.options.headless, "warm session started");
        self.session = Some(session);
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn BrowserSession>, DropwatchError> {
        self.session.as_mut().ok_or(DropwatchError::TargetClosed)
    }

    /// Navigates, restarting the browser once if its target was closed.
    pub async fn navigate(&mut self, url: &str) -> Result<(), DropwatchError> {
        self.start().await?;
        let wait = self.wait;
        let first = self.session_mut()?.navigate(url, wait).await;
        match first {
            Err(DropwatchError::TargetClosed) => {
                warn!(actor = %self.label, "browser target closed, restarting session once");
                self.discard().await;
                self.start().await?;
                self.session_mut()?.navigate(url, wait).await?;
            }
            other => other?,
        }
        self.capture_state_once().await;
        Ok(())
    }

    async fn capture_state_once(&mut self) {
        if self.state_saved || !matches!(self.options.storage_state, StorageState::Capture(_)) {
            return;
        }
        let label = self.label.clone();
        if let Ok(session) = self.session_mut() {
            match session.save_storage_state().await {
                Ok(()) => {
                    info!(actor = %label, "login state captured");
                    self.state_saved = true;
                }
                Err(e) => warn!(actor = %label, error = %e, "failed to capture login state"),
            }
        }
    }

    pub async fn reload(&mut self) -> Result<(), DropwatchError> {
        let wait = self.wait;
        self.session_mut()?.reload(wait).await
    }

    pub async fn read_visible_text(&mut self) -> Result<String, DropwatchError> {
        self.session_mut()?.read_visible_text().await
    }

    pub async fn current_url(&mut self) -> Result<String, DropwatchError> {
        self.session_mut()?.current_url().await
    }

    pub async fn content(&mut self) -> Result<String, DropwatchError> {
        self.session_mut()?.content().await
    }

    pub async fn screenshot(&mut self) -> Result<Vec<u8>, DropwatchError> {
        self.session_mut()?.screenshot().await
    }

    /// Whether the operator closed the window (or it was never started).
    pub fn is_closed(&self) -> bool {
        self.session.as_ref().is_none_or(|s| s.is_closed())
    }

    async fn discard(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.close().await;
        }
    }

    /// Closes the browser; the next use launches a fresh one.
    pub async fn close(&mut self) {
        self.discard().await;
        self.state_saved = false;
        debug!(actor = %self.label, "warm session closed");
    }
}

/// Per-actor warm sessions, keyed by actor label.
#[derive(Clone)]
pub struct WarmSessionPool {
    surface: Arc<dyn BrowserSurface>,
    wait: WaitPolicy,
    sessions: Arc<Mutex<HashMap<String, SharedSession>>>,
    closed: Arc<AtomicBool>,
}

impl WarmSessionPool {
    pub fn new(surface: Arc<dyn BrowserSurface>, wait: WaitPolicy) -> Self {
        Self {
            surface,
            wait,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The session of `label`, created (not started) on first use.
    pub fn get_or_create(&self, label: &str, options: SessionOptions) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(label.to_string())
            .or_insert_with(|| {
                let mut session = WarmSession::new(label, self.surface.clone(), options, self.wait);
                session.pool_closed = self.closed.clone();
                Arc::new(tokio::sync::Mutex::new(session))
            })
            .clone()
    }

    pub fn get(&self, label: &str) -> Option<SharedSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()
    }

    /// Starts `label`'s session in the background of `generation`, if the
    /// session exists.
    pub fn start(&self, label: &str, generation: &Generation) {
        let Some(session) = self.get(label) else {
            return;
        };
        let label = label.to_string();
        generation.spawn("warm_start", async move {
            // A running detection holds the lock; it already has a browser.
            let Ok(mut session) = session.try_lock() else {
                return;
            };
            if let Err(e) = session.start().await {
                warn!(actor = %label, error = %e, "warm session start failed");
            }
        });
    }

    /// Closes and forgets every session. Later starts fail.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<(String, SharedSession)> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (label, session) in drained {
            session.lock().await.close().await;
            debug!(actor = %label, "warm session released");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
