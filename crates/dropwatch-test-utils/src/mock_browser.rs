// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock browser surface for deterministic testing.
//!
//! Every session opened from one [`MockBrowser`] shares a script: a list
//! of page texts returned by successive reads (the last one sticks), an
//! optional landing URL and injectable failures. Calls are counted so
//! tests can assert "no text was read" or "one restart happened".

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use dropwatch_core::{
    BrowserSession, BrowserSurface, DropwatchError, SessionOptions, WaitPolicy,
};

#[derive(Default)]
struct BrowserState {
    texts: Vec<String>,
    reads: usize,
    landing_url: Option<String>,
    navigate_error: Option<String>,
    /// Navigations still to fail with a closed target.
    close_on_navigate: usize,
    /// Sessions with an id below this were closed by the "operator".
    closed_below: u64,
    next_session: u64,
    opens: usize,
    navigations: Vec<String>,
    reloads: usize,
    storage_saves: usize,
    options: Vec<SessionOptions>,
}

/// A mock browser surface. Clones share the same script and counters.
#[derive(Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<BrowserState>>,
}

impl MockBrowser {
    /// Create a browser whose pages render no text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a browser whose pages always render `text`.
    pub fn with_text(text: &str) -> Self {
        let browser = Self::new();
        browser.set_texts(&[text]);
        browser
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Texts returned by successive reads; the last one repeats.
    pub fn set_texts(&self, texts: &[&str]) {
        let mut state = self.lock();
        state.texts = texts.iter().map(|t| t.to_string()).collect();
        state.reads = 0;
    }

    /// URL reported by `current_url` after any navigation.
    pub fn set_landing_url(&self, url: &str) {
        self.lock().landing_url = Some(url.to_string());
    }

    /// Make every navigation fail with a browser error carrying `message`.
    pub fn fail_navigations(&self, message: &str) {
        self.lock().navigate_error = Some(message.to_string());
    }

    /// The next navigation reports a closed target once.
    pub fn close_target_on_next_navigate(&self) {
        self.close_target_on_navigates(1);
    }

    /// The next `n` navigations (not counting `about:blank`) report a
    /// closed target.
    pub fn close_target_on_navigates(&self, n: usize) {
        self.lock().close_on_navigate = n;
    }

    /// Simulate the operator closing every open window.
    pub fn close_window(&self) {
        let mut state = self.lock();
        state.closed_below = state.next_session;
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn reload_count(&self) -> usize {
        self.lock().reloads
    }

    pub fn storage_save_count(&self) -> usize {
        self.lock().storage_saves
    }

    /// URLs passed to `navigate`, in call order (including `about:blank`).
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    /// Options of every opened session, in open order.
    pub fn opened_with(&self) -> Vec<SessionOptions> {
        self.lock().options.clone()
    }
}

#[async_trait]
impl BrowserSurface for MockBrowser {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, DropwatchError> {
        let id = {
            let mut state = self.lock();
            state.opens += 1;
            state.options.push(options);
            let id = state.next_session;
            state.next_session += 1;
            id
        };
        Ok(Box::new(MockSession {
            id,
            browser: self.clone(),
            url: "about:blank".to_string(),
            closed: false,
        }))
    }
}

/// One session of a [`MockBrowser`].
pub struct MockSession {
    id: u64,
    browser: MockBrowser,
    url: String,
    closed: bool,
}

impl MockSession {
    fn check_open(&self) -> Result<(), DropwatchError> {
        if self.is_closed() {
            Err(DropwatchError::TargetClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str, _wait: WaitPolicy) -> Result<(), DropwatchError> {
        self.check_open()?;
        let mut state = self.browser.lock();
        state.navigations.push(url.to_string());
        if url != "about:blank" {
            if state.close_on_navigate > 0 {
                state.close_on_navigate -= 1;
                return Err(DropwatchError::TargetClosed);
            }
            if let Some(message) = &state.navigate_error {
                return Err(DropwatchError::browser(message.clone()));
            }
        }
        self.url = match (&state.landing_url, url) {
            (_, "about:blank") | (None, _) => url.to_string(),
            (Some(landing), _) => landing.clone(),
        };
        Ok(())
    }

    async fn reload(&mut self, _wait: WaitPolicy) -> Result<(), DropwatchError> {
        self.check_open()?;
        self.browser.lock().reloads += 1;
        Ok(())
    }

    async fn read_visible_text(&mut self) -> Result<String, DropwatchError> {
        self.check_open()?;
        let mut state = self.browser.lock();
        let index = state.reads.min(state.texts.len().saturating_sub(1));
        state.reads += 1;
        Ok(state.texts.get(index).cloned().unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String, DropwatchError> {
        self.check_open()?;
        Ok(self.url.clone())
    }

    async fn content(&mut self) -> Result<String, DropwatchError> {
        self.check_open()?;
        let state = self.browser.lock();
        let text = state.texts.last().cloned().unwrap_or_default();
        Ok(format!("<html><body>{text}</body></html>"))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DropwatchError> {
        self.check_open()?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn save_storage_state(&mut self) -> Result<(), DropwatchError> {
        self.check_open()?;
        self.browser.lock().storage_saves += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.id < self.browser.lock().closed_below
    }

    async fn close(&mut self) -> Result<(), DropwatchError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> SessionOptions {
        SessionOptions {
            profile_dir: PathBuf::from("/tmp/profile"),
            proxy: None,
            headless: true,
            storage_state: Default::default(),
            executable: None,
        }
    }

    #[tokio::test]
    async fn last_text_sticks() {
        let browser = MockBrowser::new();
        browser.set_texts(&["loading", "done"]);
        let mut session = browser.open_session(options()).await.unwrap();
        assert_eq!(session.read_visible_text().await.unwrap(), "loading");
        assert_eq!(session.read_visible_text().await.unwrap(), "done");
        assert_eq!(session.read_visible_text().await.unwrap(), "done");
        assert_eq!(browser.read_count(), 3);
    }

    #[tokio::test]
    async fn closed_window_reports_target_closed() {
        let browser = MockBrowser::with_text("hi");
        let mut session = browser.open_session(options()).await.unwrap();
        browser.close_window();
        assert!(session.is_closed());
        assert!(matches!(
            session.read_visible_text().await,
            Err(DropwatchError::TargetClosed)
        ));
        let fresh = browser.open_session(options()).await.unwrap();
        assert!(!fresh.is_closed());
    }

    #[tokio::test]
    async fn landing_url_replaces_target() {
        let browser = MockBrowser::new();
        browser.set_landing_url("https://www.twitch.tv/drops");
        let mut session = browser.open_session(options()).await.unwrap();
        session
            .navigate("https://app.example/x", WaitPolicy::Commit)
            .await
            .unwrap();
        assert_eq!(session.current_url().await.unwrap(), "https://www.twitch.tv/drops");
    }
}
