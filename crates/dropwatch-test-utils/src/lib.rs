// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Dropwatch integration tests.
//!
//! Provides deterministic mocks for every collaborator trait and a
//! pipeline harness, so engine behaviour can be tested without a live
//! messaging network or a real browser.
//!
//! # Components
//!
//! - [`MockSource`] - Messaging source with injectable posts and live events
//! - [`MockBrowser`] - Browser surface serving scripted page text
//! - [`MockSink`] - Notification sink capturing sent texts
//! - [`PipelineHarness`] - Controller, rows and mocks wired together

pub mod harness;
pub mod mock_browser;
pub mod mock_sink;
pub mod mock_source;

pub use harness::{PipelineHarness, PipelineHarnessBuilder};
pub use mock_browser::{MockBrowser, MockSession};
pub use mock_sink::MockSink;
pub use mock_source::MockSource;
