// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chromium browser surface for the Dropwatch engine.
//!
//! Implements [`BrowserSurface`] on chromiumoxide. Every session is its own
//! Chromium process: a persistent profile directory by default, or a
//! throwaway profile seeded from a captured storage-state file.

pub mod session;
pub mod storage;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use dropwatch_core::{
    BrowserProxy, BrowserSession, BrowserSurface, DropwatchError, SessionOptions, StorageState,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

pub use session::ChromiumSession;
pub use storage::StorageStateFile;

/// Launches one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumSurface {
    nav_timeout: Duration,
}

impl ChromiumSurface {
    /// `nav_timeout` bounds every navigation and reload.
    pub fn new(nav_timeout: Duration) -> Self {
        Self { nav_timeout }
    }
}

#[async_trait]
impl BrowserSurface for ChromiumSurface {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, DropwatchError> {
        // `use` mode runs on a scratch profile that lives as long as the session.
        let (user_data_dir, scratch) = match &options.storage_state {
            StorageState::Use(_) => {
                let dir = tempfile::Builder::new()
                    .prefix("dropwatch-profile-")
                    .tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
            StorageState::Off | StorageState::Capture(_) => {
                tokio::fs::create_dir_all(&options.profile_dir).await?;
                (options.profile_dir.clone(), None)
            }
        };

        let config = launch_config(&options, &user_data_dir)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DropwatchError::browser(format!("failed to launch chromium: {e}")))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_closed = closed.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler event error");
                }
            }
            handler_closed.store(true, Ordering::SeqCst);
            debug!("chromium connection closed");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(DropwatchError::browser(format!("failed to open page: {e}")));
            }
        };

        info!(
            profile = %user_data_dir.display(),
            headless = options.headless,
            proxied = options.proxy.is_some(),
            "chromium session launched"
        );

        let mut session = ChromiumSession::new(
            browser,
            page,
            handler_task,
            closed,
            scratch,
            options.storage_state.clone(),
            self.nav_timeout,
        );
        session.watch_target_close().await;
        if let Some(proxy) = &options.proxy
            && proxy.username.is_some()
        {
            session.answer_proxy_auth(proxy).await;
        }
        if let StorageState::Use(path) = &options.storage_state {
            match StorageStateFile::load(path).await {
                Ok(state) => session.import_state(&state).await,
                Err(e) => warn!(path = %path.display(), error = %e, "storage state not loaded"),
            }
        }
        Ok(Box::new(session))
    }
}

/// Chromium flags for one session.
pub fn launch_args(options: &SessionOptions) -> Vec<String> {
    let mut args = vec![
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-features=Translate".to_string(),
    ];
    if let Some(BrowserProxy { server, .. }) = &options.proxy {
        args.push(format!("--proxy-server={server}"));
    }
    args
}

fn launch_config(
    options: &SessionOptions,
    user_data_dir: &Path,
) -> Result<BrowserConfig, DropwatchError> {
    let mut builder = BrowserConfig::builder()
        .user_data_dir(user_data_dir)
        .args(launch_args(options));
    if !options.headless {
        builder = builder.with_head().window_size(480, 900);
    }
    if let Some(executable) = &options.executable {
        builder = builder.chrome_executable(executable);
    }
    builder
        .build()
        .map_err(|e| DropwatchError::browser(format!("invalid browser config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(proxy: Option<BrowserProxy>) -> SessionOptions {
        SessionOptions {
            profile_dir: PathBuf::from("/tmp/dropwatch/profiles/alpha"),
            proxy,
            headless: true,
            storage_state: StorageState::Off,
            executable: None,
        }
    }

    #[test]
    fn proxy_becomes_server_flag_without_credentials() {
        let args = launch_args(&options(Some(BrowserProxy {
            server: "http://10.0.0.1:8080".into(),
            username: Some("user".into()),
            password: Some("secret".into()),
        })));
        assert!(args.contains(&"--proxy-server=http://10.0.0.1:8080".to_string()));
        assert!(args.iter().all(|a| !a.contains("secret")));
    }

    #[test]
    fn no_proxy_flag_without_proxy() {
        let args = launch_args(&options(None));
        assert!(args.iter().all(|a| !a.starts_with("--proxy-server")));
    }
}
