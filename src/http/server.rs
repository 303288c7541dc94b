//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the proxy pipeline
//! - Serve the reserved `/health` and `/metrics` paths locally
//! - Select a backend, track the connection, forward the request
//! - Run the health monitor alongside the server
//! - Drain in-flight requests on shutdown, up to the grace period

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::time;
use tower::ServiceBuilder;

use crate::config::ProxyConfig;
use crate::health::HealthMonitor;
use crate::http::middleware::request_log_middleware;
use crate::http::request::request_id_middleware;
use crate::http::state::AppState;
use crate::http::upstream::{self, UpstreamTarget};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::CONTENT_TYPE;
use crate::observability::ProxyMetrics;
use crate::security::rate_limit_middleware;

/// HTTP server for the load balancer.
pub struct HttpServer {
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with its own metrics registry.
    pub fn new(config: ProxyConfig) -> Self {
        let metrics = Arc::new(ProxyMetrics::from_config(&config.observability));
        Self::with_metrics(config, metrics)
    }

    /// Create a server that records into `metrics`.
    pub fn with_metrics(config: ProxyConfig, metrics: Arc<ProxyMetrics>) -> Self {
        let state = AppState::new(&config, metrics);
        Self { state, config }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let pipeline = ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_log_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                rate_limit_middleware,
            ));

        let proxied = Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .layer(pipeline);

        Router::new()
            .route("/health", any(health))
            .route("/metrics", any(render_metrics))
            .route_layer(middleware::from_fn(request_id_middleware))
            .merge(proxied)
            .with_state(self.state.clone())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once `shutdown` fires and in-flight requests have drained or
    /// the grace period has elapsed.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.state.pool.len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(self.state.pool.clone(), self.config.health_check.clone());
        let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let drain_signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain_signal.wait().await })
                .await
        });

        // The server only returns early on an accept loop error.
        tokio::select! {
            result = &mut server => {
                shutdown.trigger();
                let _ = monitor_task.await;
                return result.map_err(io::Error::other)?;
            }
            _ = shutdown.wait() => {}
        }

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");

        let result = match time::timeout(grace, &mut server).await {
            Ok(joined) => joined.map_err(io::Error::other)?,
            Err(_) => {
                tracing::warn!("Grace period elapsed, closing remaining connections");
                server.abort();
                Ok(())
            }
        };
        let _ = monitor_task.await;

        tracing::info!("HTTP server stopped");
        result
    }
}

/// Core proxy handler: select, track, forward.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let policy = state.policy();
    let Some(backend) = state.pool.select(policy.strategy) else {
        tracing::warn!(path = %request.uri().path(), "No backend available");
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response();
    };

    let result = backend
        .upstream()
        .forward(request, addr.ip(), policy.request_timeout, backend.track())
        .await;

    let mut response = match result {
        Ok(response) => response,
        Err(e) => upstream::on_error(backend.id(), &e),
    };
    response
        .extensions_mut()
        .insert(UpstreamTarget(backend.id().to_owned()));
    response
}

async fn health() -> &'static str {
    "OK"
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.metrics.render()).into_response()
}
