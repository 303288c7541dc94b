//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (signals, reload, optional exporter and watcher)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Failing to bind the listening port is fatal
//! - Optional extras (exporter, file watcher) log and continue on failure

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::reload::Reloader;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the balancer with a validated configuration until shutdown.
///
/// `config_path` is re-read on every reload.
pub async fn run(config_path: &Path, config: ProxyConfig) -> Result<(), StartupError> {
    start_exporter(&config.observability.exporter_address);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    let _watcher = if config.reload.watch {
        match ConfigWatcher::new(config_path, reload_tx.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start, SIGHUP reload still works");
                None
            }
        }
    } else {
        None
    };

    let server = HttpServer::new(config);

    tokio::spawn(signals::listen(reload_tx, shutdown.clone()));
    tokio::spawn(Reloader::new(config_path, server.state().clone()).run(reload_rx, shutdown.clone()));

    server.run(listener, shutdown).await.map_err(StartupError::Serve)
}

fn start_exporter(address: &str) {
    if address.is_empty() {
        return;
    }
    match address.parse::<SocketAddr>() {
        Ok(addr) => {
            if let Err(e) = metrics::init_exporter(addr) {
                tracing::error!(error = %e, "Failed to start Prometheus exporter");
            }
        }
        Err(_) => tracing::error!(exporter_address = %address, "Failed to parse exporter address"),
    }
}
