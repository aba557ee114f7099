// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging source trait: where posts come from.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DropwatchError;
use crate::types::{ChannelHandle, ChannelRef, JoinState, Post, PostEvent};

/// One actor's authenticated connection to the shared message channel.
#[async_trait]
pub trait MessagingSource: Send + Sync + 'static {
    /// Human-readable name of this source instance.
    fn name(&self) -> &str;

    /// Establishes the transport connection.
    async fn connect(&self) -> Result<(), DropwatchError>;

    /// Drops the transport connection. Idempotent.
    async fn disconnect(&self) -> Result<(), DropwatchError>;

    /// Whether the credentials on this connection are logged in.
    async fn is_authorized(&self) -> Result<bool, DropwatchError>;

    /// Resolves a channel reference (`@name`, numeric id, invite hash).
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, DropwatchError>;

    /// Whether this identity can already read the channel.
    async fn is_member(&self, channel: &ChannelHandle) -> Result<bool, DropwatchError>;

    /// Joins the channel once. Reports `AlreadyMember` when no join was needed.
    async fn join_channel(&self, channel: &ChannelHandle) -> Result<JoinState, DropwatchError>;

    /// Live new-post events for the channel.
    async fn subscribe(
        &self,
        channel: &ChannelHandle,
    ) -> Result<BoxStream<'static, PostEvent>, DropwatchError>;

    /// The newest `limit` posts, newest first.
    async fn fetch_latest(
        &self,
        channel: &ChannelHandle,
        limit: usize,
    ) -> Result<Vec<Post>, DropwatchError>;

    /// A single post by message id, `None` if it is not (yet) visible.
    async fn fetch_by_id(
        &self,
        channel: &ChannelHandle,
        msg_id: i64,
    ) -> Result<Option<Post>, DropwatchError>;

    /// Cheap liveness call used by the keepalive scheduler.
    async fn ping(&self) -> Result<(), DropwatchError>;

    /// Resolves a deep link to the URL the in-app web view would render.
    async fn request_web_view(&self, link: &str) -> Result<Option<String>, DropwatchError>;
}
