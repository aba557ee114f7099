// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `PipelineHarness` assembles a complete engine with mock sources, a mock
//! browser, a capturing sink and a temporary data directory. Tests drive
//! it through the controller and observe the row table.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use dropwatch_config::{ActorConfig, DropwatchConfig, MonitorMode};
use dropwatch_core::{DropwatchError, RowState, StatusCode};
use dropwatch_engine::{
    ActorSpec, ControlCommand, Notifier, RewardCounter, RowStore, RunContext, RunController,
    RunState, StatusLog, WarmSessionPool,
};

use crate::mock_browser::MockBrowser;
use crate::mock_sink::MockSink;
use crate::mock_source::MockSource;

/// How long `wait_for_*` helpers wait before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(30);

type ConfigHook = Box<dyn FnOnce(&mut DropwatchConfig) + Send>;

/// Builder for creating pipeline test environments.
pub struct PipelineHarnessBuilder {
    actors: Vec<(String, Option<String>, Arc<MockSource>)>,
    browser: MockBrowser,
    sink: Option<MockSink>,
    status_log: bool,
    hooks: Vec<ConfigHook>,
}

impl PipelineHarnessBuilder {
    fn new() -> Self {
        Self {
            actors: Vec::new(),
            browser: MockBrowser::new(),
            sink: None,
            status_log: false,
            hooks: Vec::new(),
        }
    }

    /// Add an actor backed by a fresh [`MockSource`].
    pub fn with_actor(self, label: &str) -> Self {
        let source = Arc::new(MockSource::new(label));
        self.with_source(label, source)
    }

    /// Add an actor backed by `source`.
    pub fn with_source(mut self, label: &str, source: Arc<MockSource>) -> Self {
        self.actors.push((label.to_string(), None, source));
        self
    }

    /// Add an actor that goes through `proxy` (`host:port[:user:pass]`).
    pub fn with_proxied_actor(mut self, label: &str, proxy: &str) -> Self {
        let source = Arc::new(MockSource::new(label));
        self.actors
            .push((label.to_string(), Some(proxy.to_string()), source));
        self
    }

    pub fn with_browser(mut self, browser: MockBrowser) -> Self {
        self.browser = browser;
        self
    }

    /// Deliver notifications to `sink`.
    pub fn with_sink(mut self, sink: MockSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Write `status_live.tsv` under the temporary data directory.
    pub fn with_status_log(mut self) -> Self {
        self.status_log = true;
        self
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, hook: impl FnOnce(&mut DropwatchConfig) + Send + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Build the harness. The controller starts in `stopped`.
    pub async fn build(self) -> Result<PipelineHarness, DropwatchError> {
        let dir = tempfile::TempDir::new()?;

        let mut config = DropwatchConfig::default();
        config.daemon.data_dir = dir.path().to_path_buf();
        config.watch.channel = "@drops".to_string();
        config.watch.monitor = MonitorMode::LiveOnly;
        config.watch.auto_stop_secs = 0;
        config.open.pre_open_delay_ms = "0".to_string();
        config.detect.checks_per_cycle = 3;
        config.detect.check_interval_ms = 100;
        config.detect.dump_on_fail = false;
        config.detect.dump_on_timeout = false;
        config.browser.headless = true;
        config.actors = self
            .actors
            .iter()
            .map(|(label, proxy, _)| ActorConfig {
                label: label.clone(),
                bot_token: format!("test-token-{label}"),
                proxy: proxy.clone(),
                profile_dir: None,
            })
            .collect();
        for hook in self.hooks {
            hook(&mut config);
        }
        let config = Arc::new(config);

        let specs: Vec<ActorSpec> = config
            .actors
            .iter()
            .zip(&self.actors)
            .map(|(actor, (_, _, source))| {
                ActorSpec::from_config(&config, actor, source.clone())
            })
            .collect();

        let log = if self.status_log {
            let (handle, _task) = StatusLog::spawn(config.logs_dir().join(dropwatch_engine::status_log::FILE_NAME));
            Some(handle)
        } else {
            None
        };
        let rows = RowStore::new(
            specs.iter().map(|s| (s.label.clone(), s.proxy_display())),
            log,
        );
        let rewards = RewardCounter::load(config.rewards_path()).await;
        let notifier = match &self.sink {
            Some(sink) => Notifier::new(
                Some(Arc::new(sink.clone()) as Arc<dyn dropwatch_core::NotificationSink>),
                config.notify.on_error,
            ),
            None => Notifier::disabled(),
        };
        let sessions = WarmSessionPool::new(
            Arc::new(self.browser.clone()),
            config.browser.wait_until,
        );
        let (control, control_rx) = mpsc::unbounded_channel();

        let ctx = RunContext {
            config,
            rows: rows.clone(),
            rewards: rewards.clone(),
            notifier,
            sessions,
            control,
        };
        let controller = RunController::new(ctx, specs);

        Ok(PipelineHarness {
            controller,
            rows,
            rewards,
            control_rx,
            sources: self
                .actors
                .into_iter()
                .map(|(label, _, source)| (label, source))
                .collect(),
            browser: self.browser,
            sink: self.sink,
            dir,
        })
    }
}

/// A complete engine wired to mocks.
pub struct PipelineHarness {
    pub controller: RunController,
    pub rows: RowStore,
    pub rewards: RewardCounter,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    sources: Vec<(String, Arc<MockSource>)>,
    pub browser: MockBrowser,
    pub sink: Option<MockSink>,
    dir: tempfile::TempDir,
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::new()
    }

    /// The mock source of `label`.
    ///
    /// # Panics
    ///
    /// Panics if no actor with that label was added.
    pub fn source(&self, label: &str) -> Arc<MockSource> {
        self.sources
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| panic!("no actor named {label}"))
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn state(&self) -> RunState {
        self.controller.state()
    }

    pub fn run(&mut self) -> bool {
        self.controller.run()
    }

    pub async fn pause(&mut self) -> bool {
        self.controller.pause().await
    }

    pub async fn quit(&mut self) {
        self.controller.quit().await;
    }

    /// Applies every control request the engine queued so far.
    pub async fn pump_control(&mut self) -> Vec<ControlCommand> {
        let mut applied = Vec::new();
        while let Ok(command) = self.control_rx.try_recv() {
            self.controller.apply(command).await;
            applied.push(command);
        }
        applied
    }

    /// Waits for the next control request and applies it.
    pub async fn next_control(&mut self) -> Option<ControlCommand> {
        let command = tokio::time::timeout(WAIT_LIMIT, self.control_rx.recv())
            .await
            .ok()
            .flatten()?;
        self.controller.apply(command).await;
        Some(command)
    }

    pub fn row(&self, actor: &str) -> Option<RowState> {
        self.rows.get(actor)
    }

    /// Polls the row table until `actor` shows `status`.
    ///
    /// # Panics
    ///
    /// Panics with the current row when the status does not show up in time.
    pub async fn wait_for_status(&self, actor: &str, status: StatusCode) -> RowState {
        self.wait_for_row(actor, |row| row.status == status).await
    }

    /// Polls the row table until `actor`'s row satisfies `pred`.
    pub async fn wait_for_row<F>(&self, actor: &str, pred: F) -> RowState
    where
        F: Fn(&RowState) -> bool,
    {
        let found = tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                if let Some(row) = self.rows.get(actor)
                    && pred(&row)
                {
                    return row;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        match found {
            Ok(row) => row,
            Err(_) => panic!("row condition not met for {actor}: {:?}", self.rows.get(actor)),
        }
    }
}
