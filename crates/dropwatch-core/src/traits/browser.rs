// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Browser automation traits.

use async_trait::async_trait;

use crate::error::DropwatchError;
use crate::types::{SessionOptions, WaitPolicy};

/// Launches browser sessions.
#[async_trait]
pub trait BrowserSurface: Send + Sync + 'static {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, DropwatchError>;
}

/// One browser context with a single working page.
///
/// Implementations return [`DropwatchError::TargetClosed`] once the operator
/// has closed the window, so callers can tell it apart from other failures.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates the page and returns once `wait` is satisfied.
    async fn navigate(&mut self, url: &str, wait: WaitPolicy) -> Result<(), DropwatchError>;

    async fn reload(&mut self, wait: WaitPolicy) -> Result<(), DropwatchError>;

    /// Rendered, human-visible page text.
    async fn read_visible_text(&mut self) -> Result<String, DropwatchError>;

    async fn current_url(&mut self) -> Result<String, DropwatchError>;

    /// Full page markup.
    async fn content(&mut self) -> Result<String, DropwatchError>;

    /// Full-page PNG screenshot.
    async fn screenshot(&mut self) -> Result<Vec<u8>, DropwatchError>;

    /// Exports login state (cookies, local storage) to the configured path.
    async fn save_storage_state(&mut self) -> Result<(), DropwatchError>;

    fn is_closed(&self) -> bool;

    async fn close(&mut self) -> Result<(), DropwatchError>;
}
