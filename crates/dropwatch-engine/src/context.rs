// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit run context handed to every engine component.

use std::path::PathBuf;
use std::sync::Arc;

use dropwatch_config::{ActorConfig, DropwatchConfig, ProxySpec, StorageStateMode, WatchMode};
use dropwatch_core::{MessagingSource, SessionOptions, StorageState};
use tokio::sync::mpsc;
use tracing::warn;

use crate::controller::ControlCommand;
use crate::notify::Notifier;
use crate::rewards::RewardCounter;
use crate::rows::RowStore;
use crate::session_pool::WarmSessionPool;

/// State shared by all generations of one process.
///
/// Nothing here is per-generation: dedup maps, queues and schedulers are
/// created fresh by every `run`.
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<DropwatchConfig>,
    pub rows: RowStore,
    pub rewards: RewardCounter,
    pub notifier: Notifier,
    pub sessions: WarmSessionPool,
    /// Requests to the controller owner (pause on user stop, auto-stop).
    pub control: mpsc::UnboundedSender<ControlCommand>,
}

impl RunContext {
    pub fn is_replay(&self) -> bool {
        self.config.watch.mode == WatchMode::Replay
    }

    /// Asks the controller owner to apply `command`.
    pub fn request(&self, command: ControlCommand) {
        if self.control.send(command).is_err() {
            warn!(?command, "controller is gone, request dropped");
        }
    }
}

/// One configured actor: its identity, transport and browser settings.
#[derive(Clone)]
pub struct ActorSpec {
    pub label: String,
    pub source: Arc<dyn MessagingSource>,
    pub proxy: Option<ProxySpec>,
    pub session: SessionOptions,
}

impl ActorSpec {
    pub fn from_config(
        config: &DropwatchConfig,
        actor: &ActorConfig,
        source: Arc<dyn MessagingSource>,
    ) -> Self {
        let proxy = actor
            .proxy
            .as_deref()
            .and_then(|raw| ProxySpec::parse(raw).ok().flatten());
        let session = SessionOptions {
            profile_dir: config.profile_dir(actor),
            proxy: proxy.as_ref().map(ProxySpec::to_browser_proxy),
            headless: config.browser.headless,
            storage_state: storage_state(config),
            executable: config.browser.executable.clone(),
        };
        Self {
            label: actor.label.clone(),
            source,
            proxy,
            session,
        }
    }

    /// Masked proxy shown in the status table.
    pub fn proxy_display(&self) -> String {
        self.proxy
            .as_ref()
            .map(ProxySpec::display_masked)
            .unwrap_or_default()
    }
}

fn storage_state(config: &DropwatchConfig) -> StorageState {
    let path = || -> PathBuf {
        match &config.browser.storage_state_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => config.daemon.data_dir.join(p),
            None => config.daemon.data_dir.join("storage_state.json"),
        }
    };
    match config.browser.storage_state {
        StorageStateMode::Off => StorageState::Off,
        StorageStateMode::Use => StorageState::Use(path()),
        StorageStateMode::Capture => StorageState::Capture(path()),
    }
}
