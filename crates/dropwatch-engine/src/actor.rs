// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-actor task: connect, authorize, join, warm up, then monitor.
//!
//! Startup failures leave the row on the failure status and end the task;
//! they never affect other actors.

use std::sync::Arc;
use std::time::Duration;

use dropwatch_core::{
    ChannelHandle, ChannelRef, JoinState, PostKey, StatusCode, classify_proxy_error,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, connect_with_backoff};
use crate::context::{ActorSpec, RunContext};
use crate::dedup::DedupBus;
use crate::detector::ResultDetector;
use crate::fanout::{Fanout, OpenItem};
use crate::generation::Generation;
use crate::links::parse_message_link;
use crate::registry::{ActorRuntime, RuntimeRegistry};
use crate::resolver::LinkResolver;
use crate::worker::ActorOpenWorker;

/// Disconnects `spec`'s source, giving up after `limit`.
pub async fn disconnect_bounded(spec: &ActorSpec, limit: Duration) {
    match tokio::time::timeout(limit, spec.source.disconnect()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(actor = %spec.label, error = %e, "disconnect failed"),
        Err(_) => warn!(
            actor = %spec.label,
            limit_secs = limit.as_secs(),
            "disconnect timed out"
        ),
    }
}

/// What the actor watches once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorTarget {
    /// Listen to the channel and open whatever the bus fans out.
    Live(ChannelRef),
    /// Open one existing post, then idle.
    Replay { channel: ChannelRef, msg_id: i64 },
}

impl ActorTarget {
    /// Target derived from `[watch]`; `Err` carries the row detail.
    pub fn from_context(ctx: &RunContext) -> Result<Self, &'static str> {
        let watch = &ctx.config.watch;
        if ctx.is_replay() {
            let link = watch.replay_link.as_deref().unwrap_or("");
            let (channel, msg_id) = parse_message_link(link).map_err(|_| "bad link")?;
            Ok(Self::Replay { channel, msg_id })
        } else {
            ChannelRef::parse(&watch.channel)
                .map(Self::Live)
                .map_err(|_| "bad channel")
        }
    }

    fn channel(&self) -> &ChannelRef {
        match self {
            Self::Live(channel) | Self::Replay { channel, .. } => channel,
        }
    }
}

/// Everything one actor task needs from the current generation.
pub struct ActorTask {
    pub ctx: RunContext,
    pub spec: ActorSpec,
    pub generation: Generation,
    pub registry: RuntimeRegistry,
    pub fanout: Fanout,
    /// `None` in replay mode.
    pub bus: Option<Arc<DedupBus>>,
    pub detector: ResultDetector,
    pub resolver: LinkResolver,
}

impl ActorTask {
    /// Runs until `cancel` fires, then unregisters and disconnects.
    pub async fn run(self, cancel: CancellationToken) {
        let label = self.spec.label.clone();
        tokio::select! {
            _ = cancel.cancelled() => debug!(actor = %label, "actor task cancelled"),
            _ = self.drive() => debug!(actor = %label, "actor task ended"),
        }
        self.registry.unregister(&label);
        self.fanout.unregister(&label);
        let limit = Duration::from_secs(self.ctx.config.transport.connect_timeout_secs);
        disconnect_bounded(&self.spec, limit).await;
    }

    async fn drive(&self) {
        let rows = &self.ctx.rows;
        let label = self.spec.label.as_str();

        let target = match ActorTarget::from_context(&self.ctx) {
            Ok(target) => target,
            Err(detail) => {
                rows.update(label, StatusCode::Error, detail, "");
                return;
            }
        };

        rows.update(label, StatusCode::Login, "", "");
        self.connect().await;

        match self.spec.source.is_authorized().await {
            Ok(true) => {}
            Ok(false) => {
                rows.update(label, StatusCode::Error, "not authorized", "");
                return;
            }
            Err(e) => {
                warn!(actor = %label, error = %e, "authorization check failed");
                rows.update(label, StatusCode::Error, "not authorized", "");
                return;
            }
        }

        let channel = match self.spec.source.resolve_channel(target.channel()).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(actor = %label, channel = %target.channel(), error = %e, "channel resolve failed");
                rows.update(label, StatusCode::Error, "no access to channel", "");
                return;
            }
        };

        if !self.ensure_joined(&channel).await {
            return;
        }

        let session = self
            .ctx
            .sessions
            .get_or_create(label, self.spec.session.clone());
        if self.spec.session.headless {
            self.ctx.sessions.start(label, &self.generation);
        }
        let mut worker = ActorOpenWorker::new(
            &self.ctx,
            &self.spec,
            session,
            self.detector.clone(),
            self.generation.clone(),
        );

        self.registry.register(ActorRuntime {
            label: label.to_string(),
            source: self.spec.source.clone(),
            channel: channel.clone(),
        });
        info!(actor = %label, chat_id = channel.chat_id, "actor ready");

        match target {
            ActorTarget::Replay { msg_id, .. } => {
                self.replay(&mut worker, &channel, msg_id).await;
            }
            ActorTarget::Live(_) => {
                let depth = self.ctx.config.watch.open_queue_depth.max(1);
                let (tx, rx) = tokio::sync::mpsc::channel(depth);
                self.fanout.register(label, tx);
                self.generation.spawn("open_worker", worker.run(rx));
                self.listen(&channel).await;
            }
        }
        std::future::pending::<()>().await;
    }

    async fn connect(&self) {
        let transport = &self.ctx.config.transport;
        let backoff = Backoff::new(
            Duration::from_secs(transport.backoff_initial_secs),
            Duration::from_secs(transport.backoff_max_secs),
        );
        let rows = &self.ctx.rows;
        let label = self.spec.label.as_str();
        let proxied = self.spec.proxy.is_some();
        connect_with_backoff(
            self.spec.source.as_ref(),
            Duration::from_secs(transport.connect_timeout_secs),
            backoff,
            |e| match classify_proxy_error(&e.full_message()).filter(|_| proxied) {
                Some(hint) => {
                    let hint = if hint.is_empty() { e.kind() } else { hint };
                    rows.update(label, StatusCode::ProxyTgr, hint, "");
                }
                None => {
                    rows.update(label, StatusCode::Error, &format!("connect fail: {}", e.kind()), "");
                }
            },
        )
        .await;
    }

    /// Joins the channel when needed. Returns `false` if the actor must stop.
    async fn ensure_joined(&self, channel: &ChannelHandle) -> bool {
        let rows = &self.ctx.rows;
        let label = self.spec.label.as_str();
        let source = &self.spec.source;

        match source.is_member(channel).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                // Membership unknown; let the fetches decide.
                debug!(actor = %label, error = %e, "membership check failed");
                return true;
            }
        }

        rows.update(label, StatusCode::NoAccess, "not a member", "");
        rows.update(label, StatusCode::Joining, "", "");
        match source.join_channel(channel).await {
            Ok(JoinState::Joined) => {
                rows.update(label, StatusCode::Joined, "", "");
                true
            }
            Ok(JoinState::AlreadyMember) => true,
            Ok(JoinState::Failed) => {
                rows.update(label, StatusCode::JoinFail, "private/invite required", "");
                false
            }
            Err(e) => {
                warn!(actor = %label, error = %e, "join failed");
                rows.update(label, StatusCode::JoinFail, &e.to_string(), "");
                false
            }
        }
    }

    async fn replay(&self, worker: &mut ActorOpenWorker, channel: &ChannelHandle, msg_id: i64) {
        let rows = &self.ctx.rows;
        let label = self.spec.label.as_str();
        let post = match self.spec.source.fetch_by_id(channel, msg_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                rows.update(label, StatusCode::Error, "msg not found", "");
                return;
            }
            Err(e) => {
                warn!(actor = %label, msg_id, error = %e, "replay fetch failed");
                rows.update(label, StatusCode::Error, "msg not found", "");
                return;
            }
        };
        let key = if post.key.msg_id == 0 {
            PostKey::new(channel.chat_id, msg_id)
        } else {
            post.key
        };
        rows.update(label, StatusCode::Post, &format!("id={msg_id}"), "");

        let resolution = self.resolver.resolve_post(&post);
        let Some(url) = resolution.url else {
            rows.update(
                label,
                StatusCode::NoLink,
                "no miniapp link",
                resolution.ticket.as_deref().unwrap_or(""),
            );
            return;
        };
        worker
            .handle(OpenItem {
                url,
                ticket: resolution.ticket,
                key,
            })
            .await;
    }

    /// Forwards live post events to the bus until the stream ends.
    async fn listen(&self, channel: &ChannelHandle) {
        let rows = &self.ctx.rows;
        let label = self.spec.label.as_str();
        let listens = self.ctx.config.watch.monitor.listens();

        let stream = match (&self.bus, listens) {
            (Some(_), true) => match self.spec.source.subscribe(channel).await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!(actor = %label, error = %e, "live subscription failed");
                    None
                }
            },
            _ => None,
        };

        rows.update(label, StatusCode::Monitoring, "", "");

        let (Some(mut stream), Some(bus)) = (stream, self.bus.as_ref()) else {
            return;
        };
        while let Some(event) = stream.next().await {
            if event.chat_id != channel.chat_id {
                continue;
            }
            self.ctx.sessions.start(label, &self.generation);
            bus.submit(event.key(), label);
        }
        debug!(actor = %label, "live stream ended");
    }
}
