//! Shared state handed to every handler and middleware.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::{ProxyConfig, RateLimitSettings, Strategy};
use crate::http::upstream::{build_client, HttpClient};
use crate::load_balancer::pool::{backends_from_urls, BackendPool};
use crate::observability::ProxyMetrics;
use crate::security::client_key::{extractor_for, KeyExtractor};
use crate::security::Limiter;

/// The reloadable part of request handling.
#[derive(Debug)]
pub struct TrafficPolicy {
    pub strategy: Strategy,
    pub limits: RateLimitSettings,
    /// Upper bound on waiting for a backend's response head.
    pub request_timeout: Duration,
    pub limiter: Arc<Limiter>,
    pub key_extractor: Arc<dyn KeyExtractor>,
}

impl TrafficPolicy {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let limits = config.rate_limit_settings();
        Self {
            strategy: config.balancer.strategy,
            limits,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            limiter: Arc::new(Limiter::from_settings(&limits)),
            key_extractor: extractor_for(config.limiter.client_key),
        }
    }

    /// Derive the policy for a reloaded config.
    ///
    /// The limiter, and so its bucket state, carries over when its settings
    /// are unchanged.
    pub fn reconfigure(&self, config: &ProxyConfig) -> Self {
        let mut next = Self::from_config(config);
        if next.limits == self.limits {
            next.limiter = Arc::clone(&self.limiter);
        }
        next
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BackendPool>,
    pub policy: Arc<ArcSwap<TrafficPolicy>>,
    pub metrics: Arc<ProxyMetrics>,
    pub client: HttpClient,
}

impl AppState {
    pub fn new(config: &ProxyConfig, metrics: Arc<ProxyMetrics>) -> Self {
        let client = build_client(&config.timeouts);
        let pool = BackendPool::from_backends(backends_from_urls(&config.backends, &client));

        Self {
            pool: Arc::new(pool),
            policy: Arc::new(ArcSwap::from_pointee(TrafficPolicy::from_config(config))),
            metrics,
            client,
        }
    }

    /// The current traffic policy.
    pub fn policy(&self) -> Arc<TrafficPolicy> {
        self.policy.load_full()
    }

    /// Swap in the backends and traffic policy of a new config.
    ///
    /// The new backend set is built completely before it is published, so
    /// selection sees either the old set or the new one.
    pub fn apply_config(&self, config: &ProxyConfig) {
        let backends = backends_from_urls(&config.backends, &self.client);
        let count = backends.len();
        self.pool.replace(backends);

        let next = self.policy().reconfigure(config);
        let limiter_kept = Arc::ptr_eq(&next.limiter, &self.policy().limiter);
        self.policy.store(Arc::new(next));

        tracing::info!(
            backends = count,
            rate = config.rate_limit,
            burst = config.burst,
            limiter_kept,
            "Configuration applied"
        );
    }
}
