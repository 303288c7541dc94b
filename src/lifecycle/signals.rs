//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - SIGTERM or Ctrl+C triggers graceful shutdown and ends the listener

use tokio::sync::mpsc;

use crate::lifecycle::reload::ReloadTrigger;
use crate::lifecycle::Shutdown;

/// Listen for process signals until a terminate request arrives.
pub async fn listen(reload_tx: mpsc::UnboundedSender<ReloadTrigger>, shutdown: Shutdown) {
    wait_for_terminate(&reload_tx, &shutdown).await;
    shutdown.trigger();
}

#[cfg(unix)]
async fn wait_for_terminate(reload_tx: &mpsc::UnboundedSender<ReloadTrigger>, shutdown: &Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut hangup, mut terminate) = match (
        signal(SignalKind::hangup()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(hangup), Ok(terminate)) => (hangup, terminate),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers, only Ctrl+C is honoured");
            wait_for_ctrl_c(shutdown).await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("Received SIGHUP, reloading configuration");
                let _ = reload_tx.send(ReloadTrigger::Signal);
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
                return;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler failed");
                }
                tracing::info!("Received Ctrl+C");
                return;
            }
            _ = shutdown.wait() => return,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_terminate(_reload_tx: &mpsc::UnboundedSender<ReloadTrigger>, shutdown: &Shutdown) {
    wait_for_ctrl_c(shutdown).await;
}

async fn wait_for_ctrl_c(shutdown: &Shutdown) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Ctrl+C handler failed");
            }
            tracing::info!("Received Ctrl+C");
        }
        _ = shutdown.wait() => {}
    }
}
