// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dropwatch serve` command implementation.
//!
//! Wires the configured actors to Bot API sources and Chromium sessions,
//! starts the status presenter and then applies operator commands (stdin
//! lines, signals, engine requests) to the run controller until `quit`.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use dropwatch_browser::ChromiumSurface;
use dropwatch_config::{DropwatchConfig, ProxySpec};
use dropwatch_core::{BrowserSurface, DropwatchError, MessagingSource, NotificationSink};
use dropwatch_engine::status_log::FILE_NAME;
use dropwatch_engine::{
    ActorSpec, ControlCommand, Notifier, RewardCounter, RowStore, RunContext, RunController,
    RunState, StatusLog, StatusLogHandle, WarmSessionPool, install_signal_handler,
};
use dropwatch_telegram::{BotApiSource, TelegramNotifier};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::presenter::{self, PresenterMode};

/// How long the status log writer gets to drain after quit.
const LOG_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Start in `stopped` and wait for a `run` command.
    pub idle: bool,
    pub plain: bool,
}

/// A controller wired to its collaborators, not yet running.
pub struct Assembled {
    pub controller: RunController,
    pub rows: RowStore,
    pub control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    pub control_tx: mpsc::UnboundedSender<ControlCommand>,
}

/// Builds the run context and controller.
///
/// `sources` pairs with `config.actors` by position.
pub async fn assemble(
    config: Arc<DropwatchConfig>,
    sources: Vec<Arc<dyn MessagingSource>>,
    surface: Arc<dyn BrowserSurface>,
    sink: Option<Arc<dyn NotificationSink>>,
    log: Option<StatusLogHandle>,
) -> Assembled {
    let specs: Vec<ActorSpec> = config
        .actors
        .iter()
        .zip(sources)
        .map(|(actor, source)| ActorSpec::from_config(&config, actor, source))
        .collect();
    let rows = RowStore::new(
        specs.iter().map(|s| (s.label.clone(), s.proxy_display())),
        log,
    );
    let rewards = RewardCounter::load(config.rewards_path()).await;
    let notifier = Notifier::new(sink, config.notify.on_error);
    let sessions = WarmSessionPool::new(surface, config.browser.wait_until);
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let ctx = RunContext {
        config,
        rows: rows.clone(),
        rewards,
        notifier,
        sessions,
        control: control_tx.clone(),
    };
    Assembled {
        controller: RunController::new(ctx, specs),
        rows,
        control_rx,
        control_tx,
    }
}

/// Applies commands until the controller reaches `quit`.
pub async fn drive(
    controller: &mut RunController,
    control_rx: &mut mpsc::UnboundedReceiver<ControlCommand>,
) {
    while let Some(command) = control_rx.recv().await {
        info!(%command, "control command");
        if controller.apply(command).await == RunState::Quit {
            return;
        }
    }
    // Every sender is gone; nothing can ask for quit any more.
    controller.quit().await;
}

/// Runs the `dropwatch serve` command.
pub async fn run_serve(config: DropwatchConfig, options: ServeOptions) -> Result<(), DropwatchError> {
    init_tracing(&config.daemon.log_level);
    info!(actors = config.actors.len(), "starting dropwatch serve");

    let logs_dir = config.logs_dir();
    tokio::fs::create_dir_all(&logs_dir).await?;
    let (log, log_task) = StatusLog::spawn(logs_dir.join(FILE_NAME));

    let sources = build_sources(&config)?;
    let sink = build_sink(&config);
    let surface: Arc<dyn BrowserSurface> = Arc::new(ChromiumSurface::new(Duration::from_millis(
        config.detect.nav_timeout_ms,
    )));
    let config = Arc::new(config);

    let Assembled {
        mut controller,
        rows,
        mut control_rx,
        control_tx,
    } = assemble(config, sources, surface, sink, Some(log)).await;

    let signals = install_signal_handler(control_tx.clone());
    let stdin = spawn_stdin_commands(control_tx.clone());
    drop(control_tx);

    let cancel = CancellationToken::new();
    let mode = if options.plain {
        PresenterMode::Plain
    } else {
        PresenterMode::Rich {
            color: std::io::stdout().is_terminal(),
        }
    };
    let presenter = presenter::spawn_presenter(rows.clone(), logs_dir, mode, cancel.clone());

    if options.idle {
        info!("idle; type `run` to start");
    } else {
        controller.run();
    }
    drive(&mut controller, &mut control_rx).await;

    cancel.cancel();
    let _ = presenter.await;
    stdin.abort();
    signals.abort();

    for row in rows.snapshot() {
        println!("{:<12} {}", row.actor, row.status.label(&row.detail));
    }
    info!(rewards = controller.context().rewards.get().await, "dropwatch stopped");

    // The log writer ends once the last row store handle is dropped.
    drop(controller);
    drop(rows);
    if tokio::time::timeout(LOG_DRAIN, log_task).await.is_err() {
        warn!("status log writer did not drain in time");
    }
    Ok(())
}

fn build_sources(config: &DropwatchConfig) -> Result<Vec<Arc<dyn MessagingSource>>, DropwatchError> {
    if config.open.only_first_party_links {
        warn!("bot accounts cannot open Telegram mini-apps; such drops will show `no webview url`");
    }
    config
        .actors
        .iter()
        .map(|actor| {
            let proxy = match actor.proxy.as_deref() {
                Some(raw) => ProxySpec::parse(raw).map_err(DropwatchError::Config)?,
                None => None,
            };
            let source = BotApiSource::new(&actor.label, &actor.bot_token, proxy.as_ref())?;
            Ok(Arc::new(source) as Arc<dyn MessagingSource>)
        })
        .collect()
}

fn build_sink(config: &DropwatchConfig) -> Option<Arc<dyn NotificationSink>> {
    if !config.notify.is_active() {
        info!("notifications disabled");
        return None;
    }
    let token = config.notify.bot_token.as_deref().unwrap_or_default();
    let chat = config.notify.chat_id.as_deref().unwrap_or_default();
    match TelegramNotifier::new(token, chat) {
        Ok(notifier) => Some(Arc::new(notifier)),
        Err(e) => {
            warn!(error = %e, "notifier not configured, continuing without notifications");
            None
        }
    }
}

/// Forwards operator commands typed on stdin. Ends at EOF.
fn spawn_stdin_commands(control: mpsc::UnboundedSender<ControlCommand>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match ControlCommand::parse(&line) {
                    Some(command) => {
                        if control.send(command).is_err() {
                            return;
                        }
                    }
                    None => warn!(input = %line.trim(), "unknown command (run, pause, quit, status)"),
                },
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    return;
                }
            }
        }
    })
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so the status table owns stdout.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dropwatch={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropwatch_config::{ActorConfig, MonitorMode};
    use dropwatch_core::StatusCode;
    use dropwatch_test_utils::{MockBrowser, MockSink, MockSource};

    fn config(dir: &std::path::Path) -> DropwatchConfig {
        let mut config = DropwatchConfig::default();
        config.daemon.data_dir = dir.to_path_buf();
        config.watch.channel = "@drops".into();
        config.watch.monitor = MonitorMode::LiveOnly;
        config.open.pre_open_delay_ms = "0".into();
        config.detect.checks_per_cycle = 2;
        config.detect.check_interval_ms = 50;
        config.detect.dump_on_fail = false;
        config.detect.dump_on_timeout = false;
        config.browser.headless = true;
        config.actors = vec![ActorConfig {
            label: "alpha".into(),
            bot_token: "1:a".into(),
            proxy: Some("10.0.0.1:8080:user:pw".into()),
            profile_dir: None,
        }];
        config
    }

    async fn wait_for(rows: &RowStore, status: StatusCode) {
        for _ in 0..200 {
            if rows.status_of("alpha") == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("alpha never reached {status}, row: {:?}", rows.get("alpha"));
    }

    #[tokio::test]
    async fn assembled_controller_opens_a_drop_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new("alpha"));
        let sink = MockSink::new();
        let mut wired = assemble(
            Arc::new(config(dir.path())),
            vec![source.clone() as Arc<dyn MessagingSource>],
            Arc::new(MockBrowser::with_text("This offer has already been claimed.")),
            Some(Arc::new(sink.clone())),
            None,
        )
        .await;

        assert_eq!(wired.rows.get("alpha").unwrap().proxy, "10.0.0.1:8080:user:***");
        assert!(wired.controller.run());
        wait_for(&wired.rows, StatusCode::Monitoring).await;

        source.add_post(source.launch_post(
            10,
            "Drop: $5",
            "https://t.me/drops_bot/app?startapp=abc",
        ));
        source.emit(10);
        wait_for(&wired.rows, StatusCode::Success).await;
        assert_eq!(sink.wait_for(1).await.len(), 1);
        assert_eq!(wired.controller.context().rewards.get().await, 1);

        wired.control_tx.send(ControlCommand::Quit).unwrap();
        drive(&mut wired.controller, &mut wired.control_rx).await;
        assert_eq!(wired.controller.state(), RunState::Quit);
    }

    #[tokio::test]
    async fn drive_applies_commands_until_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut wired = assemble(
            Arc::new(config(dir.path())),
            vec![Arc::new(MockSource::new("alpha")) as Arc<dyn MessagingSource>],
            Arc::new(MockBrowser::new()),
            None,
            None,
        )
        .await;

        for command in [ControlCommand::Run, ControlCommand::Status, ControlCommand::Pause, ControlCommand::Quit] {
            wired.control_tx.send(command).unwrap();
        }
        drive(&mut wired.controller, &mut wired.control_rx).await;
        assert_eq!(wired.controller.state(), RunState::Quit);
        assert_eq!(wired.rows.status_of("alpha"), Some(StatusCode::Stopped));
    }

    #[test]
    fn bad_actor_token_fails_wiring() {
        let mut config = DropwatchConfig::default();
        config.actors = vec![ActorConfig {
            label: "alpha".into(),
            bot_token: "  ".into(),
            proxy: None,
            profile_dir: None,
        }];
        assert!(build_sources(&config).is_err());
    }

    #[test]
    fn inactive_notify_builds_no_sink() {
        assert!(build_sink(&DropwatchConfig::default()).is_none());
    }
}
