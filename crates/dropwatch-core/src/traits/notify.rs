// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound notification trait.

use async_trait::async_trait;

use crate::error::DropwatchError;

/// Delivers short operator notifications (success/error pings).
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, text: &str) -> Result<(), DropwatchError>;
}
