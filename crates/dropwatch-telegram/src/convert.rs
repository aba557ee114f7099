// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion from Bot API messages to engine posts.
//!
//! Entity offsets in the Bot API count UTF-16 code units, so literal URL
//! entities are sliced on the UTF-16 encoding of the text.

use dropwatch_core::{ButtonTarget, InlineButton, LinkEntity, Post, PostKey};
use teloxide::types::{
    InlineKeyboardButtonKind, InlineKeyboardMarkup, Message, MessageEntity, MessageEntityKind,
};

/// Converts a channel post. Service messages without text or buttons are skipped.
pub fn post_from_message(msg: &Message) -> Option<Post> {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .unwrap_or_default();
    let post = post_from_parts(
        PostKey::new(msg.chat.id.0, i64::from(msg.id.0)),
        text,
        entities,
        msg.reply_markup(),
    );
    (!post.text.is_empty() || !post.buttons.is_empty()).then_some(post)
}

/// Builds a post from the pieces of a message.
///
/// The Bot API only reports a preview URL when the sender overrode it, so
/// `preview_url` stays empty and text entities carry the links.
pub fn post_from_parts(
    key: PostKey,
    text: &str,
    entities: &[MessageEntity],
    markup: Option<&InlineKeyboardMarkup>,
) -> Post {
    Post {
        key,
        text: text.to_string(),
        entities: link_entities(text, entities),
        preview_url: None,
        buttons: markup.map(buttons).unwrap_or_default(),
    }
}

fn link_entities(text: &str, entities: &[MessageEntity]) -> Vec<LinkEntity> {
    let utf16: Vec<u16> = text.encode_utf16().collect();
    entities
        .iter()
        .filter_map(|e| match &e.kind {
            MessageEntityKind::TextLink { url } => Some(LinkEntity::TextUrl(url.to_string())),
            MessageEntityKind::Url => {
                let end = e.offset.checked_add(e.length)?;
                let slice = utf16.get(e.offset..end)?;
                Some(LinkEntity::Url(String::from_utf16_lossy(slice)))
            }
            _ => None,
        })
        .collect()
}

fn buttons(markup: &InlineKeyboardMarkup) -> Vec<InlineButton> {
    markup
        .inline_keyboard
        .iter()
        .flatten()
        .filter_map(|b| {
            let target = match &b.kind {
                InlineKeyboardButtonKind::WebApp(info) => {
                    ButtonTarget::WebApp(info.url.to_string())
                }
                InlineKeyboardButtonKind::Url(url) => ButtonTarget::Url(url.to_string()),
                InlineKeyboardButtonKind::LoginUrl(login) => {
                    ButtonTarget::Url(login.url.to_string())
                }
                _ => return None,
            };
            Some(InlineButton {
                label: b.text.clone(),
                target,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{InlineKeyboardButton, WebAppInfo};
    use url::Url;

    fn key() -> PostKey {
        PostKey::new(-100123, 7)
    }

    #[test]
    fn literal_url_is_sliced_in_utf16_units() {
        // The emoji is two UTF-16 units.
        let text = "🎁 go https://t.me/drops_bot/app now";
        let entities = vec![MessageEntity::new(MessageEntityKind::Url, 6, 26)];
        let post = post_from_parts(key(), text, &entities, None);
        assert_eq!(
            post.entities,
            vec![LinkEntity::Url("https://t.me/drops_bot/app".into())]
        );
    }

    #[test]
    fn hidden_links_keep_their_target() {
        let url = Url::parse("https://t.me/drops_bot/app?startapp=abc").unwrap();
        let entities = vec![MessageEntity::text_link(url, 0, 5)];
        let post = post_from_parts(key(), "Claim", &entities, None);
        assert_eq!(
            post.entities,
            vec![LinkEntity::TextUrl("https://t.me/drops_bot/app?startapp=abc".into())]
        );
    }

    #[test]
    fn out_of_range_entity_is_ignored() {
        let post = post_from_parts(key(), "short", &[MessageEntity::new(MessageEntityKind::Url, 3, 40)], None);
        assert!(post.entities.is_empty());
    }

    #[test]
    fn web_app_and_url_buttons_are_kept() {
        let app = Url::parse("https://app.example/start").unwrap();
        let site = Url::parse("https://example.org/").unwrap();
        let markup = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::web_app("Launch", WebAppInfo { url: app }),
            InlineKeyboardButton::url("Site", site),
            InlineKeyboardButton::callback("Vote", "v1"),
        ]]);
        let post = post_from_parts(key(), "", &[], Some(&markup));
        assert_eq!(post.buttons.len(), 2);
        assert_eq!(post.buttons[0].label, "Launch");
        assert!(matches!(post.buttons[0].target, ButtonTarget::WebApp(_)));
        assert_eq!(post.buttons[1].url(), "https://example.org/");
    }
}
