// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram adapters for Dropwatch.
//!
//! [`BotApiSource`] implements [`dropwatch_core::MessagingSource`] for a
//! bot that administers the watched channel, receiving its posts by long
//! polling. [`TelegramNotifier`] implements
//! [`dropwatch_core::NotificationSink`] with `sendMessage`.

pub mod convert;
pub mod notifier;
pub mod source;

pub use notifier::TelegramNotifier;
pub use source::{BotApiSource, PostCache};
