// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Dropwatch engine.
//!
//! This crate provides the error type, the shared domain types and the
//! collaborator traits (messaging source, browser surface, notification
//! sink) used throughout the Dropwatch workspace.

pub mod error;
pub mod status;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{DropwatchError, ProxyLayer, classify_proxy_error};
pub use status::StatusCode;
pub use types::{
    BrowserProxy, ButtonTarget, ChannelHandle, ChannelRef, Detection, InlineButton, JoinState,
    LinkEntity, Outcome, Post, PostEvent, PostKey, RowState, SessionOptions, StorageState,
    WaitPolicy, invite_hash,
};

pub use traits::{BrowserSession, BrowserSurface, MessagingSource, NotificationSink};
