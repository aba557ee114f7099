// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the engine.
//!
//! All traits use `#[async_trait]` so the engine can hold them as trait
//! objects (`Arc<dyn MessagingSource>` and friends).

pub mod browser;
pub mod notify;
pub mod source;

pub use browser::{BrowserSession, BrowserSurface};
pub use notify::NotificationSink;
pub use source::MessagingSource;
