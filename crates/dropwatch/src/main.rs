// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dropwatch - races browser actors to open every drop posted in a channel.
//!
//! This is the binary entry point.

mod check;
mod presenter;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dropwatch_config::{ConfigError, DropwatchConfig, WatchMode};

/// Dropwatch - watches a broadcast channel and opens each drop with every actor.
#[derive(Parser, Debug)]
#[command(name = "dropwatch", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start watching (the default).
    Serve {
        /// Open this message link once instead of monitoring the channel.
        #[arg(long)]
        replay: Option<String>,
        /// Run browsers without a window.
        #[arg(long)]
        headless: bool,
        /// Wait for a `run` command instead of starting immediately.
        #[arg(long)]
        idle: bool,
        /// Line-per-change output without colors or screen redraws.
        #[arg(long)]
        plain: bool,
    },
    /// Validate the configuration and print the resolved actors.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => dropwatch_config::load_and_validate_path(path),
        None => dropwatch_config::load_and_validate(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            dropwatch_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Check) => check::run_check(&config),
        Some(Commands::Serve {
            replay,
            headless,
            idle,
            plain,
        }) => {
            if let Err(errors) = apply_overrides(&mut config, replay, headless) {
                dropwatch_config::render_errors(&errors);
                std::process::exit(1);
            }
            serve_or_exit(config, serve::ServeOptions { idle, plain }).await;
        }
        None => serve_or_exit(config, serve::ServeOptions::default()).await,
    }
}

async fn serve_or_exit(config: DropwatchConfig, options: serve::ServeOptions) {
    if let Err(e) = serve::run_serve(config, options).await {
        eprintln!("dropwatch: {e}");
        std::process::exit(1);
    }
}

/// Folds command-line flags into the loaded config and re-validates it.
fn apply_overrides(
    config: &mut DropwatchConfig,
    replay: Option<String>,
    headless: bool,
) -> Result<(), Vec<ConfigError>> {
    if let Some(link) = replay {
        config.watch.mode = WatchMode::Replay;
        config.watch.replay_link = Some(link);
    }
    if headless {
        config.browser.headless = true;
    }
    dropwatch_config::validate_config(config)
}
