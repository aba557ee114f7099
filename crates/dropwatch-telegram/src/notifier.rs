// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notifications through a separate bot.

use async_trait::async_trait;
use dropwatch_core::{DropwatchError, NotificationSink};
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::debug;

/// Sends plain-text messages to one chat via `sendMessage`.
pub struct TelegramNotifier {
    bot: Bot,
    chat: Recipient,
}

impl TelegramNotifier {
    /// `chat_id` is a numeric id or a `@channelusername`.
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, DropwatchError> {
        if bot_token.trim().is_empty() {
            return Err(DropwatchError::Config("notify.bot_token cannot be empty".into()));
        }
        Ok(Self {
            bot: Bot::new(bot_token.trim()),
            chat: recipient(chat_id)?,
        })
    }
}

fn recipient(raw: &str) -> Result<Recipient, DropwatchError> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    match raw.strip_prefix('@') {
        Some(name) if !name.is_empty() => Ok(Recipient::ChannelUsername(raw.to_string())),
        _ => Err(DropwatchError::Config(format!(
            "notify.chat_id `{raw}` must be a numeric id or @username"
        ))),
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), DropwatchError> {
        // Details carry arbitrary page text, so no parse mode.
        self.bot
            .send_message(self.chat.clone(), text)
            .await
            .map_err(|e| DropwatchError::Notify {
                message: format!("sendMessage failed: {e}"),
            })?;
        debug!(len = text.len(), "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_username_recipients() {
        assert_eq!(recipient("12345").unwrap(), Recipient::Id(ChatId(12345)));
        assert_eq!(recipient("-100987").unwrap(), Recipient::Id(ChatId(-100987)));
        assert_eq!(
            recipient("@ops_alerts").unwrap(),
            Recipient::ChannelUsername("@ops_alerts".into())
        );
    }

    #[test]
    fn bad_recipients_are_config_errors() {
        assert!(matches!(recipient("ops"), Err(DropwatchError::Config(_))));
        assert!(matches!(recipient("@"), Err(DropwatchError::Config(_))));
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(TelegramNotifier::new("", "1").is_err());
        assert!(TelegramNotifier::new("123:abc", "1").is_ok());
    }
}
