//! Outermost pipeline layer: request ID, metrics, access log.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::request::RequestId;
use crate::http::upstream::UpstreamTarget;
use crate::http::AppState;
use crate::observability::logging::ACCESS_TARGET;

/// Wrap the rest of the pipeline.
///
/// Every request is counted and timed here, including ones the rate
/// limiter rejects and ones whose forward fails.
pub async fn request_log_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    state.metrics.record_request();

    let request_id = RequestId::resolve(request.headers());
    request_id.attach(&mut request);

    let client = state.policy().key_extractor.client_key(request.headers(), addr);
    request.extensions_mut().insert(client.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;
    request_id.apply(&mut response);

    let elapsed = start.elapsed();
    state.metrics.observe_latency(elapsed);

    let backend = response
        .extensions()
        .get::<UpstreamTarget>()
        .map(|target| target.0.as_str())
        .unwrap_or("-");

    tracing::info!(
        target: ACCESS_TARGET,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_seconds = elapsed.as_secs_f64(),
        client = %client,
        request_id = %request_id,
        backend,
        "Request completed"
    );

    response
}
