// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single consumer of the bus: resolve each accepted post once, then fan out.

use std::sync::Arc;
use std::time::Duration;

use dropwatch_core::StatusCode;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::dedup::BusItem;
use crate::fanout::{Fanout, OpenItem};
use crate::generation::Generation;
use crate::registry::RuntimeRegistry;
use crate::resolver::LinkResolver;
use crate::rows::RowStore;

/// Bus receiver shared across restarts of the supervised consumer loop.
pub type BusReceiver = Arc<Mutex<mpsc::Receiver<BusItem>>>;

#[derive(Clone)]
pub struct PostProcessor {
    rx: BusReceiver,
    registry: RuntimeRegistry,
    resolver: LinkResolver,
    fanout: Fanout,
    rows: RowStore,
    generation: Generation,
    /// Revert delay for `NO_LINK` rows; `None` keeps the row as is.
    no_link_cooldown: Option<Duration>,
}

impl PostProcessor {
    pub fn new(
        rx: mpsc::Receiver<BusItem>,
        registry: RuntimeRegistry,
        resolver: LinkResolver,
        fanout: Fanout,
        rows: RowStore,
        generation: Generation,
        no_link_cooldown: Option<Duration>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
            registry,
            resolver,
            fanout,
            rows,
            generation,
            no_link_cooldown,
        }
    }

    /// Consumes the bus until it closes.
    pub async fn run(self) {
        let mut rx = self.rx.lock().await;
        while let Some(item) = rx.recv().await {
            self.process(item).await;
        }
        debug!("bus closed, post processor exiting");
    }

    /// Resolves one accepted post and hands it to every actor lane.
    ///
    /// Returns the number of lanes that took the item.
    pub async fn process(&self, item: BusItem) -> usize {
        let BusItem { key, origin } = item;
        self.rows
            .update(&origin, StatusCode::Post, &format!("id={}", key.msg_id), "");

        let Some(runtime) = self.registry.get_or_any(&origin) else {
            warn!(%key, origin = %origin, "no ready actor to resolve post");
            return 0;
        };
        let resolution = self
            .resolver
            .resolve(runtime.source.as_ref(), &runtime.channel, key)
            .await;

        let Some(url) = resolution.url else {
            info!(%key, origin = %origin, "post has no launch link");
            self.rows.update(
                &origin,
                StatusCode::NoLink,
                "no miniapp link",
                resolution.ticket.as_deref().unwrap_or(""),
            );
            if let Some(after) = self.no_link_cooldown {
                self.generation.spawn_cooldown(
                    &self.rows,
                    &origin,
                    after,
                    StatusCode::NoLink,
                    StatusCode::Monitoring,
                );
            }
            return 0;
        };

        let open = OpenItem {
            url,
            ticket: resolution.ticket,
            key,
        };
        let delivered = self.fanout.fanout(&open);
        info!(%key, lanes = delivered, "post fanned out");
        delivered
    }
}
