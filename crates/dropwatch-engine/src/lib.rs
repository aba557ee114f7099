// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-actor watch/open orchestration engine.
//!
//! Data flow of one run generation:
//!
//! ```text
//! listener / poller → DedupBus → PostProcessor (LinkResolver) → Fanout
//!     → ActorOpenWorker (per actor) → ResultDetector → RowStore
//! ```
//!
//! [`RunController`] owns the generation and implements run, pause and quit.

pub mod actor;
pub mod backoff;
pub mod context;
pub mod controller;
pub mod dedup;
pub mod detector;
pub mod fanout;
pub mod generation;
pub mod links;
pub mod notify;
pub mod processor;
pub mod registry;
pub mod resolver;
pub mod rewards;
pub mod rows;
pub mod scheduler;
pub mod session_pool;
pub mod shutdown;
pub mod status_log;
pub mod worker;

pub use actor::{ActorTarget, ActorTask};
pub use backoff::{Backoff, connect_with_backoff};
pub use context::{ActorSpec, RunContext};
pub use controller::{ControlCommand, RunController, RunState};
pub use dedup::{BusItem, DedupBus, DedupMap, Submission};
pub use detector::{DetectSettings, PhraseSet, ResultDetector, classify_text};
pub use fanout::{Fanout, OpenItem};
pub use generation::Generation;
pub use notify::Notifier;
pub use processor::PostProcessor;
pub use registry::{ActorRuntime, RuntimeRegistry};
pub use resolver::{LinkResolver, Resolution};
pub use rewards::RewardCounter;
pub use rows::{PollOverlay, RowStore};
pub use scheduler::{KeepaliveScheduler, PollScheduler, effective_poll_interval};
pub use session_pool::{SharedSession, WarmSession, WarmSessionPool};
pub use shutdown::install_signal_handler;
pub use status_log::{StatusLog, StatusLogHandle};
pub use worker::ActorOpenWorker;
