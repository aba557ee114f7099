// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run/pause/quit lifecycle.
//!
//! ```text
//! stopped → running ⇄ paused
//!     any → quit (terminal)
//! ```
//!
//! Every `run` builds a fresh [`Generation`] with its own bus, dedup map,
//! schedulers and actor tasks. Pausing cancels that generation and freezes
//! the rows; nothing from it is reused by the next run.

use std::sync::Arc;
use std::time::Duration;

use dropwatch_core::StatusCode;
use strum::Display;
use tracing::{debug, info, warn};

use crate::actor::{ActorTask, disconnect_bounded};
use crate::context::{ActorSpec, RunContext};
use crate::dedup::DedupBus;
use crate::detector::{DetectSettings, ResultDetector};
use crate::fanout::Fanout;
use crate::generation::Generation;
use crate::processor::PostProcessor;
use crate::registry::RuntimeRegistry;
use crate::resolver::LinkResolver;
use crate::scheduler::{KeepaliveScheduler, PollScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    Paused,
    Quit,
}

/// Operator or engine request for the controller owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ControlCommand {
    Run,
    Pause,
    Quit,
    Status,
}

impl ControlCommand {
    /// Parses an operator command line (`run`, `pause`, `quit`, `status`).
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "run" | "r" | "resume" | "start" => Some(Self::Run),
            "pause" | "p" | "stop" => Some(Self::Pause),
            "quit" | "q" | "exit" => Some(Self::Quit),
            "status" | "s" => Some(Self::Status),
            _ => None,
        }
    }
}

pub struct RunController {
    ctx: RunContext,
    actors: Vec<ActorSpec>,
    detector: ResultDetector,
    state: RunState,
    generation: Option<Generation>,
    next_id: u64,
}

impl RunController {
    pub fn new(ctx: RunContext, actors: Vec<ActorSpec>) -> Self {
        let detector = ResultDetector::new(DetectSettings::from_config(&ctx.config));
        Self::with_detector(ctx, actors, detector)
    }

    /// Like [`new`](Self::new) with explicit detection settings.
    pub fn with_detector(ctx: RunContext, actors: Vec<ActorSpec>, detector: ResultDetector) -> Self {
        Self {
            ctx,
            actors,
            detector,
            state: RunState::Stopped,
            generation: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// The generation of the current run, if running.
    pub fn generation(&self) -> Option<&Generation> {
        self.generation.as_ref()
    }

    /// Starts a new generation. Returns `false` if already running or quit.
    pub fn run(&mut self) -> bool {
        match self.state {
            RunState::Running | RunState::Quit => return false,
            RunState::Stopped | RunState::Paused => {}
        }
        self.next_id += 1;
        let generation = Generation::new(self.next_id);
        let ctx = &self.ctx;
        let config = &ctx.config;
        let live = !ctx.is_replay();

        ctx.rows.thaw();
        ctx.rows.clear_poll_overlay();
        ctx.rows.set_all(StatusCode::Waiting, "");

        let registry = RuntimeRegistry::new();
        let fanout = Fanout::new();
        let resolver = LinkResolver::new(
            config.watch.launch_button_text.clone(),
            config.watch.link_fallback,
        );
        let labels: Vec<String> = self.actors.iter().map(|a| a.label.clone()).collect();

        let bus = if live {
            let (bus, rx) = DedupBus::new(
                config.watch.effective_dedup_ttl(),
                config.watch.bus_capacity,
                ctx.rows.clone(),
            );
            let bus = Arc::new(bus);
            let processor = PostProcessor::new(
                rx,
                registry.clone(),
                resolver.clone(),
                fanout.clone(),
                ctx.rows.clone(),
                generation.clone(),
                Some(Duration::from_secs(config.open.no_link_cooldown_secs)),
            );
            generation.spawn_supervised("post_processor", move || processor.clone().run());

            let monitor = config.watch.monitor;
            if monitor.polls() {
                let (labels, registry, bus, rows) =
                    (labels.clone(), registry.clone(), bus.clone(), ctx.rows.clone());
                let base = config.watch.effective_poll_interval();
                generation.spawn_supervised("poll", move || {
                    PollScheduler::new(labels.clone(), registry.clone(), bus.clone(), rows.clone(), base)
                        .run()
                });
            }
            if monitor.listens() {
                let (labels, registry) = (labels.clone(), registry.clone());
                let interval = config.watch.effective_keepalive_interval();
                generation.spawn_supervised("keepalive", move || {
                    KeepaliveScheduler::new(labels.clone(), registry.clone(), interval).run()
                });
            }
            Some(bus)
        } else {
            None
        };

        for spec in &self.actors {
            let task = ActorTask {
                ctx: ctx.clone(),
                spec: spec.clone(),
                generation: generation.clone(),
                registry: registry.clone(),
                fanout: fanout.clone(),
                bus: bus.clone(),
                detector: self.detector.clone(),
                resolver: resolver.clone(),
            };
            generation.spawn_graceful(move |token| task.run(token));
        }

        if live
            && !config.browser.headless
            && let Some(after) = config.watch.effective_auto_stop()
        {
            let ctx = ctx.clone();
            generation.spawn("auto_stop", async move {
                tokio::time::sleep(after).await;
                info!(after_secs = after.as_secs(), "auto-stop guard fired");
                ctx.request(ControlCommand::Pause);
            });
        }

        info!(
            generation = generation.id(),
            actors = self.actors.len(),
            mode = if live { "live" } else { "replay" },
            "run started"
        );
        self.generation = Some(generation);
        self.state = RunState::Running;
        true
    }

    async fn teardown(&mut self) {
        if let Some(generation) = self.generation.take() {
            generation.shutdown().await;
        }
        self.ctx.rows.clear_poll_overlay();
        self.ctx.rows.set_all(StatusCode::Stopped, "");
        self.ctx.rows.freeze();
    }

    /// Cancels the current generation and freezes the rows.
    pub async fn pause(&mut self) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        self.teardown().await;
        self.state = RunState::Paused;
        info!("run paused");
        true
    }

    /// Tears everything down and closes every warm session. Terminal.
    pub async fn quit(&mut self) {
        if self.state == RunState::Quit {
            return;
        }
        if self.state == RunState::Running {
            self.teardown().await;
        }
        self.ctx.sessions.close_all().await;
        let limit = Duration::from_secs(self.ctx.config.transport.connect_timeout_secs);
        for spec in &self.actors {
            disconnect_bounded(spec, limit).await;
        }
        self.state = RunState::Quit;
        info!("quit");
    }

    /// Applies one command and returns the resulting state.
    pub async fn apply(&mut self, command: ControlCommand) -> RunState {
        match command {
            ControlCommand::Run => {
                if !self.run() {
                    debug!(state = %self.state, "run ignored");
                }
            }
            ControlCommand::Pause => {
                if !self.pause().await {
                    debug!(state = %self.state, "pause ignored");
                }
            }
            ControlCommand::Quit => self.quit().await,
            ControlCommand::Status => {
                let rewards = self.ctx.rewards.get().await;
                info!(state = %self.state, rewards, "status");
                for row in self.ctx.rows.snapshot() {
                    info!(
                        actor = %row.actor,
                        status = %row.status,
                        ticket = %row.ticket,
                        detail = %row.detail,
                        "row"
                    );
                }
            }
        }
        if self.state == RunState::Quit && command != ControlCommand::Quit {
            warn!(%command, "controller already quit");
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_commands_parse() {
        assert_eq!(ControlCommand::parse(" RUN\n"), Some(ControlCommand::Run));
        assert_eq!(ControlCommand::parse("p"), Some(ControlCommand::Pause));
        assert_eq!(ControlCommand::parse("quit"), Some(ControlCommand::Quit));
        assert_eq!(ControlCommand::parse("status"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse("dance"), None);
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(RunState::Paused.to_string(), "paused");
        assert_eq!(ControlCommand::Status.to_string(), "status");
    }
}
