//! Configuration hot reload.
//!
//! # Responsibilities
//! - Receive reload triggers (SIGHUP, file watcher)
//! - Load and validate the configuration file again
//! - Apply it to the running state in one step
//!
//! # Design Decisions
//! - A failed load keeps the running configuration
//! - Listener settings (host, port) only change on restart

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::config::{load_config, ConfigError};
use crate::http::AppState;
use crate::lifecycle::Shutdown;

/// What asked for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    Signal,
    FileChanged,
}

/// Applies configuration reloads to the running state.
pub struct Reloader {
    path: PathBuf,
    state: AppState,
}

impl Reloader {
    pub fn new(path: &Path, state: AppState) -> Self {
        Self {
            path: path.to_path_buf(),
            state,
        }
    }

    /// Load the file and apply it.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        self.state.apply_config(&config);
        Ok(())
    }

    /// Serve reload triggers until shutdown or until every sender is gone.
    pub async fn run(self, mut triggers: mpsc::UnboundedReceiver<ReloadTrigger>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else { break };
                    tracing::info!(?trigger, path = ?self.path, "Reloading configuration");
                    match self.reload() {
                        Ok(()) => tracing::info!("Configuration reloaded"),
                        Err(e) => tracing::error!(
                            error = %e,
                            "Failed to reload config. Keeping current configuration."
                        ),
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        tracing::debug!("Reload listener stopped");
    }
}
