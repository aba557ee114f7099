// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot API messaging source.
//!
//! A bot cannot read channel history, so this source keeps its own window
//! of the posts Telegram delivered to it (`channel_post` and
//! `edited_channel_post` updates). Edits replace the cached post, which is
//! how late-arriving buttons show up on a re-fetch. Polling therefore only
//! sees posts delivered while the source was connected.
//!
//! A bot also cannot request a mini-app web view on a user's behalf, so
//! Telegram deep links resolve to no renderable target. Plain web links
//! are opened as they are.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dropwatch_config::ProxySpec;
use dropwatch_core::{
    ChannelHandle, ChannelRef, DropwatchError, JoinState, MessagingSource, Post, PostEvent,
    PostKey,
};
use futures::stream::{self, BoxStream};
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{Recipient, UserId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::convert::post_from_message;

/// Posts kept per source.
pub const CACHE_CAPACITY: usize = 500;

const EVENT_BUFFER: usize = 256;

/// Bounded window of delivered posts, oldest evicted first.
#[derive(Debug, Default)]
pub struct PostCache {
    posts: BTreeMap<PostKey, Post>,
    capacity: usize,
}

impl PostCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            posts: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Stores `post`. Returns `true` if the key was not cached before.
    pub fn insert(&mut self, post: Post) -> bool {
        let fresh = self.posts.insert(post.key, post).is_none();
        while self.posts.len() > self.capacity {
            self.posts.pop_first();
        }
        fresh
    }

    pub fn get(&self, key: PostKey) -> Option<Post> {
        self.posts.get(&key).cloned()
    }

    /// Newest first.
    pub fn latest(&self, chat_id: i64, limit: usize) -> Vec<Post> {
        self.posts
            .range(PostKey::new(chat_id, i64::MIN)..=PostKey::new(chat_id, i64::MAX))
            .rev()
            .take(limit)
            .map(|(_, post)| post.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

struct Polling {
    token: ShutdownToken,
    task: JoinHandle<()>,
}

/// [`MessagingSource`] over the Telegram Bot API.
///
/// The bot must be an administrator of the watched channel to receive its
/// posts.
pub struct BotApiSource {
    label: String,
    bot: Bot,
    cache: Arc<Mutex<PostCache>>,
    events: broadcast::Sender<PostEvent>,
    me: Mutex<Option<UserId>>,
    polling: tokio::sync::Mutex<Option<Polling>>,
}

impl BotApiSource {
    /// Creates a source for one actor. Nothing touches the network until
    /// [`MessagingSource::connect`].
    pub fn new(
        label: &str,
        token: &str,
        proxy: Option<&ProxySpec>,
    ) -> Result<Self, DropwatchError> {
        if token.trim().is_empty() {
            return Err(DropwatchError::Config(format!(
                "actor `{label}` has an empty bot_token"
            )));
        }
        let client = match proxy {
            Some(spec) => {
                let mut proxy = reqwest::Proxy::all(spec.server()).map_err(|e| {
                    DropwatchError::Config(format!("actor `{label}` proxy: {e}"))
                })?;
                if let (Some(user), Some(pass)) = (&spec.username, &spec.password) {
                    proxy = proxy.basic_auth(user, pass);
                }
                teloxide::net::default_reqwest_settings()
                    .proxy(proxy)
                    .build()
                    .map_err(|e| DropwatchError::Transport {
                        message: format!("http client for `{label}`: {e}"),
                        source: Some(Box::new(e)),
                    })?
            }
            None => teloxide::net::default_reqwest_settings()
                .build()
                .map_err(|e| DropwatchError::Transport {
                    message: format!("http client for `{label}`: {e}"),
                    source: Some(Box::new(e)),
                })?,
        };
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            label: label.to_string(),
            bot: Bot::with_client(token.trim(), client),
            cache: Arc::new(Mutex::new(PostCache::new(CACHE_CAPACITY))),
            events,
            me: Mutex::new(None),
            polling: tokio::sync::Mutex::new(None),
        })
    }

    /// Records a delivered post; only new, unedited posts raise an event.
    pub fn remember(&self, post: Post, edited: bool) {
        record(&self.cache, &self.events, post, edited);
    }

    async fn bot_id(&self) -> Result<UserId, DropwatchError> {
        let cached = *self.me.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cached {
            return Ok(id);
        }
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| request_error("getMe", e))?;
        *self.me.lock().unwrap_or_else(PoisonError::into_inner) = Some(me.id);
        Ok(me.id)
    }
}

fn record(
    cache: &Mutex<PostCache>,
    events: &broadcast::Sender<PostEvent>,
    post: Post,
    edited: bool,
) {
    let key = post.key;
    let fresh = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(post);
    if fresh && !edited {
        // No receivers just means nobody is listening yet.
        let _ = events.send(PostEvent {
            chat_id: key.chat_id,
            msg_id: key.msg_id,
        });
    }
}

/// Whether `link` points into Telegram rather than at a web page.
fn is_telegram_link(link: &str) -> bool {
    let Ok(url) = url::Url::parse(link.trim()) else {
        return false;
    };
    if url.scheme() == "tg" {
        return true;
    }
    url.host_str().is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        host == "t.me" || host == "telegram.me"
    })
}

fn request_error(call: &str, err: RequestError) -> DropwatchError {
    DropwatchError::Transport {
        message: format!("{call}: {err}"),
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl MessagingSource for BotApiSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn connect(&self) -> Result<(), DropwatchError> {
        let mut polling = self.polling.lock().await;
        if polling.is_some() {
            return Ok(());
        }
        self.bot_id().await?;

        let handler = dptree::entry()
            .branch(Update::filter_channel_post().endpoint({
                let cache = self.cache.clone();
                let events = self.events.clone();
                move |msg: Message| {
                    let cache = cache.clone();
                    let events = events.clone();
                    async move {
                        if let Some(post) = post_from_message(&msg) {
                            record(&cache, &events, post, false);
                        }
                        respond(())
                    }
                }
            }))
            .branch(Update::filter_edited_channel_post().endpoint({
                let cache = self.cache.clone();
                let events = self.events.clone();
                move |msg: Message| {
                    let cache = cache.clone();
                    let events = events.clone();
                    async move {
                        if let Some(post) = post_from_message(&msg) {
                            record(&cache, &events, post, true);
                        }
                        respond(())
                    }
                }
            }));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|_| async {})
            .build();
        let token = dispatcher.shutdown_token();
        let label = self.label.clone();
        let task = tokio::spawn(async move {
            dispatcher.dispatch().await;
            debug!(actor = %label, "bot polling stopped");
        });
        info!(actor = %self.label, "bot polling started");
        *polling = Some(Polling { token, task });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DropwatchError> {
        let Some(Polling { token, task }) = self.polling.lock().await.take() else {
            return Ok(());
        };
        match token.shutdown() {
            Ok(done) => done.await,
            // Not dispatching yet; nothing to drain.
            Err(_) => task.abort(),
        }
        debug!(actor = %self.label, "bot disconnected");
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, DropwatchError> {
        match self.bot_id().await {
            Ok(_) => Ok(true),
            Err(DropwatchError::Transport {
                source: Some(source),
                ..
            }) if matches!(
                source.downcast_ref::<RequestError>(),
                Some(RequestError::Api(ApiError::InvalidToken))
            ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, DropwatchError> {
        let (recipient, title) = match channel {
            ChannelRef::Username(name) => {
                (Recipient::ChannelUsername(format!("@{name}")), format!("@{name}"))
            }
            ChannelRef::Id(id) => (Recipient::Id(ChatId(*id)), id.to_string()),
            ChannelRef::Invite(_) => {
                return Err(DropwatchError::transport(
                    "a bot cannot resolve invite links; use the numeric chat id",
                ));
            }
        };
        let chat = self
            .bot
            .get_chat(recipient)
            .await
            .map_err(|e| request_error("getChat", e))?;
        Ok(ChannelHandle {
            chat_id: chat.id.0,
            title,
        })
    }

    async fn is_member(&self, channel: &ChannelHandle) -> Result<bool, DropwatchError> {
        let me = self.bot_id().await?;
        let member = self
            .bot
            .get_chat_member(ChatId(channel.chat_id), me)
            .await
            .map_err(|e| request_error("getChatMember", e))?;
        Ok(member.kind.is_present())
    }

    async fn join_channel(&self, channel: &ChannelHandle) -> Result<JoinState, DropwatchError> {
        warn!(
            actor = %self.label,
            chat_id = channel.chat_id,
            "bots cannot join channels; add the bot as an administrator"
        );
        Ok(JoinState::Failed)
    }

    async fn subscribe(
        &self,
        channel: &ChannelHandle,
    ) -> Result<BoxStream<'static, PostEvent>, DropwatchError> {
        let chat_id = channel.chat_id;
        let rx = self.events.subscribe();
        let events = stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.chat_id == chat_id => return Some((event, rx)),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "post events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(events))
    }

    async fn fetch_latest(
        &self,
        channel: &ChannelHandle,
        limit: usize,
    ) -> Result<Vec<Post>, DropwatchError> {
        Ok(self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest(channel.chat_id, limit))
    }

    async fn fetch_by_id(
        &self,
        channel: &ChannelHandle,
        msg_id: i64,
    ) -> Result<Option<Post>, DropwatchError> {
        Ok(self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(PostKey::new(channel.chat_id, msg_id)))
    }

    async fn ping(&self) -> Result<(), DropwatchError> {
        self.bot
            .get_me()
            .await
            .map(|_| ())
            .map_err(|e| request_error("getMe", e))
    }

    async fn request_web_view(&self, link: &str) -> Result<Option<String>, DropwatchError> {
        if is_telegram_link(link) {
            warn!(
                actor = %self.label,
                link,
                "bot accounts cannot request mini-app web views"
            );
            return Ok(None);
        }
        Ok(Some(link.to_string()))
    }
}
