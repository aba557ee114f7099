// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal handling: SIGINT and SIGTERM become a `quit` request.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::controller::ControlCommand;

/// Installs handlers for SIGTERM and SIGINT (Ctrl+C).
///
/// The first signal sends [`ControlCommand::Quit`] on `control`; the
/// returned task then ends.
pub fn install_signal_handler(control: mpsc::UnboundedSender<ControlCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        if control.send(ControlCommand::Quit).is_err() {
            warn!("controller is gone, quit signal dropped");
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT (Ctrl+C), quitting"),
                _ = sigterm.recv() => info!("received SIGTERM, quitting"),
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, Ctrl+C only");
            let _ = ctrl_c.await;
            info!("received SIGINT (Ctrl+C), quitting");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl+C, quitting");
}
