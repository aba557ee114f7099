// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging source for deterministic testing.
//!
//! `MockSource` implements `MessagingSource` over an in-memory post table.
//! Posts can be hidden for their first few fetches to mimic late previews,
//! live events are pushed with [`MockSource::emit`], and every remote call
//! is counted for assertions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

use dropwatch_core::{
    ButtonTarget, ChannelHandle, ChannelRef, DropwatchError, InlineButton, JoinState,
    MessagingSource, Post, PostEvent, PostKey,
};

struct StoredPost {
    post: Post,
    /// Number of `fetch_by_id` calls that still return `None`.
    hidden_fetches: usize,
}

/// A mock messaging source for one actor.
pub struct MockSource {
    name: String,
    chat_id: i64,
    posts: Mutex<BTreeMap<i64, StoredPost>>,
    events: broadcast::Sender<PostEvent>,
    connect_failures: AtomicUsize,
    connect_error: Mutex<String>,
    authorized: AtomicBool,
    member: AtomicBool,
    join_result: Mutex<JoinState>,
    resolve_fails: AtomicBool,
    web_view: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    hang_disconnect: AtomicBool,
    pings: AtomicUsize,
    fetch_by_id_calls: AtomicUsize,
    fetch_latest_calls: AtomicUsize,
    web_view_requests: Mutex<Vec<String>>,
}

impl MockSource {
    /// Create a connected-on-first-try, authorized member of chat `-100123`.
    pub fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            name: name.to_string(),
            chat_id: -100123,
            posts: Mutex::new(BTreeMap::new()),
            events,
            connect_failures: AtomicUsize::new(0),
            connect_error: Mutex::new("connection refused".to_string()),
            authorized: AtomicBool::new(true),
            member: AtomicBool::new(true),
            join_result: Mutex::new(JoinState::Joined),
            resolve_fails: AtomicBool::new(false),
            web_view: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            hang_disconnect: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
            fetch_by_id_calls: AtomicUsize::new(0),
            fetch_latest_calls: AtomicUsize::new(0),
            web_view_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chat_id(mut self, chat_id: i64) -> Self {
        self.chat_id = chat_id;
        self
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Key of message `msg_id` in this source's chat.
    pub fn key(&self, msg_id: i64) -> PostKey {
        PostKey::new(self.chat_id, msg_id)
    }

    /// A post in this chat carrying one `Launch` web-app button.
    pub fn launch_post(&self, msg_id: i64, text: &str, url: &str) -> Post {
        Post {
            key: self.key(msg_id),
            text: text.to_string(),
            buttons: vec![InlineButton {
                label: "Launch".to_string(),
                target: ButtonTarget::WebApp(url.to_string()),
            }],
            ..Post::default()
        }
    }

    /// A text-only post in this chat.
    pub fn text_post(&self, msg_id: i64, text: &str) -> Post {
        Post {
            key: self.key(msg_id),
            text: text.to_string(),
            ..Post::default()
        }
    }

    /// Add a post that is visible immediately.
    pub fn add_post(&self, post: Post) {
        self.add_post_hidden_for(post, 0);
    }

    /// Add a post that `fetch_by_id` only returns after `fetches` misses.
    pub fn add_post_hidden_for(&self, post: Post, fetches: usize) {
        self.lock_posts().insert(
            post.key.msg_id,
            StoredPost {
                post,
                hidden_fetches: fetches,
            },
        );
    }

    /// Push a live event to every current subscriber.
    pub fn emit(&self, msg_id: i64) -> usize {
        self.events
            .send(PostEvent {
                chat_id: self.chat_id,
                msg_id,
            })
            .unwrap_or(0)
    }

    /// Make the next `n` connects fail with `message`.
    pub fn fail_connects(&self, n: usize, message: &str) {
        self.connect_failures.store(n, Ordering::SeqCst);
        *self
            .connect_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = message.to_string();
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Start outside the channel; `join_channel` then reports `result`.
    pub fn set_not_member(&self, result: JoinState) {
        self.member.store(false, Ordering::SeqCst);
        *self.join_result.lock().unwrap_or_else(PoisonError::into_inner) = result;
    }

    pub fn set_resolve_fails(&self, fails: bool) {
        self.resolve_fails.store(fails, Ordering::SeqCst);
    }

    /// When disabled, `request_web_view` returns `Ok(None)`.
    pub fn set_web_view(&self, enabled: bool) {
        self.web_view.store(enabled, Ordering::SeqCst);
    }

    /// Make `disconnect` never return, like a wedged transport.
    pub fn hang_on_disconnect(&self) {
        self.hang_disconnect.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn fetch_by_id_count(&self) -> usize {
        self.fetch_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_latest_count(&self) -> usize {
        self.fetch_latest_calls.load(Ordering::SeqCst)
    }

    /// Links passed to `request_web_view`, in call order.
    pub fn web_view_requests(&self) -> Vec<String> {
        self.web_view_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of live subscriptions currently open.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn lock_posts(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, StoredPost>> {
        self.posts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessagingSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), DropwatchError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let message = self
                .connect_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            return Err(DropwatchError::transport(message));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DropwatchError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.hang_disconnect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, DropwatchError> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, DropwatchError> {
        if self.resolve_fails.load(Ordering::SeqCst) {
            return Err(DropwatchError::transport(format!("cannot resolve {channel}")));
        }
        Ok(ChannelHandle {
            chat_id: self.chat_id,
            title: channel.to_string(),
        })
    }

    async fn is_member(&self, _channel: &ChannelHandle) -> Result<bool, DropwatchError> {
        Ok(self.member.load(Ordering::SeqCst))
    }

    async fn join_channel(&self, _channel: &ChannelHandle) -> Result<JoinState, DropwatchError> {
        if self.member.load(Ordering::SeqCst) {
            return Ok(JoinState::AlreadyMember);
        }
        let result = *self.join_result.lock().unwrap_or_else(PoisonError::into_inner);
        if result == JoinState::Joined {
            self.member.store(true, Ordering::SeqCst);
        }
        Ok(result)
    }

    async fn subscribe(
        &self,
        _channel: &ChannelHandle,
    ) -> Result<BoxStream<'static, PostEvent>, DropwatchError> {
        let rx = self.events.subscribe();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn fetch_latest(
        &self,
        _channel: &ChannelHandle,
        limit: usize,
    ) -> Result<Vec<Post>, DropwatchError> {
        self.fetch_latest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock_posts()
            .values()
            .rev()
            .filter(|stored| stored.hidden_fetches == 0)
            .take(limit)
            .map(|stored| stored.post.clone())
            .collect())
    }

    async fn fetch_by_id(
        &self,
        _channel: &ChannelHandle,
        msg_id: i64,
    ) -> Result<Option<Post>, DropwatchError> {
        self.fetch_by_id_calls.fetch_add(1, Ordering::SeqCst);
        let mut posts = self.lock_posts();
        let Some(stored) = posts.get_mut(&msg_id) else {
            return Ok(None);
        };
        if stored.hidden_fetches > 0 {
            stored.hidden_fetches -= 1;
            return Ok(None);
        }
        Ok(Some(stored.post.clone()))
    }

    async fn ping(&self) -> Result<(), DropwatchError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_web_view(&self, link: &str) -> Result<Option<String>, DropwatchError> {
        self.web_view_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(link.to_string());
        if !self.web_view.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(link.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(source: &MockSource) -> ChannelHandle {
        ChannelHandle {
            chat_id: source.chat_id(),
            title: "drops".into(),
        }
    }

    #[tokio::test]
    async fn hidden_post_appears_after_misses() {
        let source = MockSource::new("alpha");
        source.add_post_hidden_for(source.text_post(5, "hello"), 2);
        let ch = handle(&source);
        assert!(source.fetch_by_id(&ch, 5).await.unwrap().is_none());
        assert!(source.fetch_by_id(&ch, 5).await.unwrap().is_none());
        assert_eq!(source.fetch_by_id(&ch, 5).await.unwrap().unwrap().text, "hello");
        assert_eq!(source.fetch_by_id_count(), 3);
    }

    #[tokio::test]
    async fn latest_is_newest_visible_first() {
        let source = MockSource::new("alpha");
        source.add_post(source.text_post(3, "old"));
        source.add_post(source.text_post(9, "new"));
        source.add_post_hidden_for(source.text_post(12, "later"), 1);
        let latest = source.fetch_latest(&handle(&source), 1).await.unwrap();
        assert_eq!(latest[0].key.msg_id, 9);
    }

    #[tokio::test]
    async fn connect_failures_are_consumed() {
        let source = MockSource::new("alpha");
        source.fail_connects(2, "proxy refused");
        assert!(source.connect().await.is_err());
        assert!(source.connect().await.is_err());
        assert!(source.connect().await.is_ok());
        assert_eq!(source.connect_count(), 3);
    }

    #[tokio::test]
    async fn emitted_events_reach_subscribers() {
        let source = MockSource::new("alpha");
        let mut events = source.subscribe(&handle(&source)).await.unwrap();
        assert_eq!(source.emit(7), 1);
        let event = events.next().await.unwrap();
        assert_eq!(event.key(), source.key(7));
    }

    #[tokio::test]
    async fn join_flow() {
        let source = MockSource::new("alpha");
        source.set_not_member(JoinState::Joined);
        let ch = handle(&source);
        assert!(!source.is_member(&ch).await.unwrap());
        assert_eq!(source.join_channel(&ch).await.unwrap(), JoinState::Joined);
        assert!(source.is_member(&ch).await.unwrap());
    }
}
