// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One Chromium process with a single working page.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams as FetchEnableParams, EventAuthRequired,
    EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams, ReloadParams,
};
use chromiumoxide::cdp::browser_protocol::target::EventTargetDestroyed;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use dropwatch_core::{BrowserProxy, BrowserSession, DropwatchError, StorageState, WaitPolicy};
use futures::StreamExt;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::{OriginStorage, StorageItem, StorageStateFile, StoredCookie};

const READY_POLL: Duration = Duration::from_millis(100);

const VISIBLE_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

const LOCAL_STORAGE_JS: &str = "(() => { try { return JSON.stringify({ origin: window.location.origin, \
     items: Object.entries(window.localStorage) }); } catch (e) { return 'null'; } })()";

/// Error texts that mean the page or browser went away.
const CLOSED_MARKERS: &[&str] = &[
    "target closed",
    "no target with given id",
    "session closed",
    "receiver is gone",
    "channel closed",
    "connection closed",
];

#[derive(Deserialize)]
struct LocalStorageDump {
    origin: String,
    items: Vec<(String, String)>,
}

/// A Chromium session. Closing the window (or the process dying) flips
/// [`BrowserSession::is_closed`] and turns later calls into `TargetClosed`.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    watchers: Vec<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    /// Scratch profile of a `use`-mode session, removed on drop.
    _scratch: Option<TempDir>,
    storage: StorageState,
    nav_timeout: Duration,
}

impl ChromiumSession {
    pub(crate) fn new(
        browser: Browser,
        page: Page,
        handler: JoinHandle<()>,
        closed: Arc<AtomicBool>,
        scratch: Option<TempDir>,
        storage: StorageState,
        nav_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            page,
            handler,
            watchers: Vec::new(),
            closed,
            _scratch: scratch,
            storage,
            nav_timeout,
        }
    }

    /// Marks the session closed when its page target is destroyed.
    pub(crate) async fn watch_target_close(&mut self) {
        let mut events = match self.browser.event_listener::<EventTargetDestroyed>().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "cannot watch page target, relying on connection state");
                return;
            }
        };
        let target = self.page.target_id().clone();
        let closed = self.closed.clone();
        self.watchers.push(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.target_id == target {
                    debug!("page target destroyed");
                    closed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }));
    }

    /// Answers proxy auth challenges with the proxy's credentials.
    ///
    /// Chromium has no flag for proxy credentials, so requests are paused
    /// through the fetch domain and resumed with an auth response.
    pub(crate) async fn answer_proxy_auth(&mut self, proxy: &BrowserProxy) {
        let enable = FetchEnableParams::builder().handle_auth_requests(true).build();
        if let Err(e) = self.page.execute(enable).await {
            warn!(error = %e, "proxy auth interception unavailable");
            return;
        }
        let (mut paused, mut challenges) = match (
            self.page.event_listener::<EventRequestPaused>().await,
            self.page.event_listener::<EventAuthRequired>().await,
        ) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "proxy auth listeners unavailable");
                return;
            }
        };

        let page = self.page.clone();
        self.watchers.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let resume = ContinueRequestParams::new(event.request_id.clone());
                if let Err(e) = page.execute(resume).await {
                    debug!(error = %e, "resume paused request failed");
                }
            }
        }));

        let page = self.page.clone();
        let username = proxy.username.clone().unwrap_or_default();
        let password = proxy.password.clone().unwrap_or_default();
        self.watchers.push(tokio::spawn(async move {
            while let Some(event) = challenges.next().await {
                let response = match AuthChallengeResponse::builder()
                    .response(AuthChallengeResponseResponse::ProvideCredentials)
                    .username(username.clone())
                    .password(password.clone())
                    .build()
                {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "cannot build proxy auth response");
                        continue;
                    }
                };
                let reply = ContinueWithAuthParams::new(event.request_id.clone(), response);
                if let Err(e) = page.execute(reply).await {
                    debug!(error = %e, "proxy auth reply failed");
                }
            }
        }));
    }

    /// Seeds cookies and local storage from a captured state.
    pub(crate) async fn import_state(&mut self, state: &StorageStateFile) {
        let cookies: Vec<CookieParam> = state
            .cookies
            .iter()
            .filter_map(|c| {
                let mut builder = CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .http_only(c.http_only)
                    .secure(c.secure);
                if c.expires > 0.0 {
                    builder = builder.expires(TimeSinceEpoch::new(c.expires));
                }
                builder.build().ok()
            })
            .collect();
        let count = cookies.len();
        if !cookies.is_empty()
            && let Err(e) = self.page.set_cookies(cookies).await
        {
            warn!(error = %e, "failed to import cookies");
        }
        if let Some(script) = state.local_storage_script() {
            let params = AddScriptToEvaluateOnNewDocumentParams::new(script);
            if let Err(e) = self.page.execute(params).await {
                warn!(error = %e, "failed to install local storage seed");
            }
        }
        info!(cookies = count, origins = state.origins.len(), "login state imported");
    }

    fn storage_path(&self) -> Option<&Path> {
        match &self.storage {
            StorageState::Capture(path) | StorageState::Use(path) => Some(path),
            StorageState::Off => None,
        }
    }

    fn ensure_open(&self) -> Result<(), DropwatchError> {
        if self.is_closed() {
            Err(DropwatchError::TargetClosed)
        } else {
            Ok(())
        }
    }

    fn cdp_error(&self, stage: &str, err: CdpError) -> DropwatchError {
        let message = err.to_string();
        if self.is_closed() || looks_closed(&message) {
            self.closed.store(true, Ordering::SeqCst);
            return DropwatchError::TargetClosed;
        }
        DropwatchError::browser(format!("{stage}: {message}"))
    }

    async fn ready_state(&self) -> Result<String, DropwatchError> {
        self.page
            .evaluate("document.readyState")
            .await
            .map_err(|e| self.cdp_error("ready state", e))?
            .into_value::<String>()
            .map_err(|e| DropwatchError::browser(format!("ready state: {e}")))
    }

    async fn wait_ready(&self, wait: WaitPolicy) -> Result<(), DropwatchError> {
        let accept: &[&str] = match wait {
            WaitPolicy::Commit => return Ok(()),
            WaitPolicy::DomContentLoaded => &["interactive", "complete"],
            WaitPolicy::Load => &["complete"],
        };
        loop {
            let state = self.ready_state().await?;
            if accept.contains(&state.as_str()) {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn bounded<F>(&self, fut: F) -> Result<(), DropwatchError>
    where
        F: Future<Output = Result<(), DropwatchError>>,
    {
        match tokio::time::timeout(self.nav_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DropwatchError::Timeout {
                duration: self.nav_timeout,
            }),
        }
    }
}

/// Whether a CDP error text means the target is gone.
pub fn looks_closed(message: &str) -> bool {
    let lower = message.to_lowercase();
    CLOSED_MARKERS.iter().any(|m| lower.contains(m))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, wait: WaitPolicy) -> Result<(), DropwatchError> {
        self.ensure_open()?;
        let this = &*self;
        this.bounded(async {
            let response = this
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| this.cdp_error("navigate", e))?;
            if let Some(text) = response.result.error_text.as_deref().filter(|t| !t.is_empty()) {
                return Err(DropwatchError::browser(format!("navigation failed: {text}")));
            }
            this.wait_ready(wait).await
        })
        .await
    }

    async fn reload(&mut self, wait: WaitPolicy) -> Result<(), DropwatchError> {
        self.ensure_open()?;
        let this = &*self;
        this.bounded(async {
            this.page
                .execute(ReloadParams::default())
                .await
                .map_err(|e| this.cdp_error("reload", e))?;
            this.wait_ready(wait).await
        })
        .await
    }

    async fn read_visible_text(&mut self) -> Result<String, DropwatchError> {
        self.ensure_open()?;
        self.page
            .evaluate(VISIBLE_TEXT_JS)
            .await
            .map_err(|e| self.cdp_error("read text", e))?
            .into_value::<String>()
            .map_err(|e| DropwatchError::browser(format!("read text: {e}")))
    }

    async fn current_url(&mut self) -> Result<String, DropwatchError> {
        self.ensure_open()?;
        let url = self
            .page
            .url()
            .await
            .map_err(|e| self.cdp_error("current url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&mut self) -> Result<String, DropwatchError> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| self.cdp_error("content", e))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DropwatchError> {
        self.ensure_open()?;
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| self.cdp_error("screenshot", e))
    }

    async fn save_storage_state(&mut self) -> Result<(), DropwatchError> {
        self.ensure_open()?;
        let Some(path) = self.storage_path().map(Path::to_path_buf) else {
            debug!("storage state disabled, nothing to save");
            return Ok(());
        };

        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| self.cdp_error("cookies", e))?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect();

        let dump: Option<LocalStorageDump> = self
            .page
            .evaluate(LOCAL_STORAGE_JS)
            .await
            .map_err(|e| self.cdp_error("local storage", e))?
            .into_value::<String>()
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());
        let origin = dump.filter(|d| d.origin.starts_with("http")).map(|d| OriginStorage {
            origin: d.origin,
            local_storage: d
                .items
                .into_iter()
                .map(|(name, value)| StorageItem { name, value })
                .collect(),
        });

        let mut state = StorageStateFile::load(&path).await.unwrap_or_default();
        state.merge(cookies, origin);
        state.save(&path).await?;
        info!(path = %path.display(), cookies = state.cookies.len(), "login state saved");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), DropwatchError> {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
        if !self.is_closed() {
            if let Err(e) = self.browser.close().await {
                debug!(error = %e, "browser close request failed");
            }
            if let Err(e) = self.browser.wait().await {
                debug!(error = %e, "browser process wait failed");
            }
        }
        self.handler.abort();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
