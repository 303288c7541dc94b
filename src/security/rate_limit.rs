//! Rate limiting middleware.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{LimiterScope, RateLimitSettings};
use crate::http::request::RequestIdExt;
use crate::http::AppState;
use crate::security::client_key::ClientKey;
use crate::security::token_bucket::{KeyedLimiter, TokenBucket};

/// The admission policy in front of the dispatcher.
#[derive(Debug)]
pub enum Limiter {
    /// Rate limiting disabled.
    Unlimited,
    /// One bucket shared by all clients.
    Global(TokenBucket),
    /// One bucket per client key.
    PerClient(KeyedLimiter),
}

impl Limiter {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        if !settings.enabled {
            return Limiter::Unlimited;
        }
        match settings.scope {
            LimiterScope::Global => Limiter::Global(TokenBucket::new(settings.rate, settings.burst)),
            LimiterScope::PerClient => {
                Limiter::PerClient(KeyedLimiter::new(settings.rate, settings.burst))
            }
        }
    }

    /// Admit or reject one request from `client`.
    pub fn check(&self, client: &str) -> bool {
        match self {
            Limiter::Unlimited => true,
            Limiter::Global(bucket) => bucket.allow(),
            Limiter::PerClient(buckets) => buckets.allow(client),
        }
    }
}

/// Middleware function for rate limiting.
///
/// Rejections short-circuit with 429; the outer request log still records them.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let policy = state.policy();
    let key = match request.extensions().get::<ClientKey>() {
        Some(key) => key.clone(),
        None => policy.key_extractor.client_key(request.headers(), addr),
    };

    if policy.limiter.check(&key.0) {
        next.run(request).await
    } else {
        let request_id = request.request_id().map(|id| id.as_str()).unwrap_or("-");
        tracing::debug!(client = %key, request_id, "Rate limit exceeded");
        state.metrics.record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}
