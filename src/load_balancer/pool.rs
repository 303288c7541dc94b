//! Backend pool management.
//!
//! # Responsibilities
//! - Own the ordered backend set behind an atomically swappable snapshot
//! - Apply load balancing algorithms to select backends
//! - Sweep every backend with a connectivity probe

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinSet;

use crate::config::Strategy;
use crate::health::probe;
use crate::http::upstream::HttpClient;
use crate::load_balancer::{
    backend::Backend, least_conn::LeastConnections, round_robin::RoundRobin, LoadBalancer,
};
use crate::observability::metrics;

/// The ordered set of backends plus the selection algorithms.
///
/// Readers load a snapshot and work against it; writers publish a complete
/// new snapshot. A selection racing with a reload therefore sees either the
/// old or the new set, never a mix.
#[derive(Debug)]
pub struct BackendPool {
    backends: ArcSwap<Vec<Arc<Backend>>>,
    round_robin: RoundRobin,
    least_conn: LeastConnections,
}

impl Default for BackendPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::from_backends(Vec::new())
    }

    pub fn from_backends(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends: ArcSwap::from_pointee(backends),
            round_robin: RoundRobin::new(),
            least_conn: LeastConnections::new(),
        }
    }

    /// Append a backend. It is eligible for selection immediately.
    pub fn add_backend(&self, backend: Arc<Backend>) {
        self.backends.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&backend));
            next
        });
    }

    /// Remove every backend.
    pub fn clear(&self) {
        self.backends.store(Arc::new(Vec::new()));
    }

    /// Publish a complete new backend set in one swap.
    pub fn replace(&self, backends: Vec<Arc<Backend>>) {
        self.backends.store(Arc::new(backends));
    }

    /// The current generation of backends.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.load().is_empty()
    }

    /// Round-robin selection, skipping dead backends.
    pub fn next_peer(&self) -> Option<Arc<Backend>> {
        let backends = self.backends.load();
        self.round_robin.next_server(&backends)
    }

    /// Alive backend with the fewest active connections.
    pub fn least_connections(&self) -> Option<Arc<Backend>> {
        let backends = self.backends.load();
        self.least_conn.next_server(&backends)
    }

    pub fn select(&self, strategy: Strategy) -> Option<Arc<Backend>> {
        match strategy {
            Strategy::LeastConnections => self.least_connections(),
            Strategy::RoundRobin => self.next_peer(),
        }
    }

    /// Probe every backend and record the outcome as its liveness.
    ///
    /// Probes run concurrently; each backend reflects its own latest probe.
    pub async fn health_check(&self, timeout: Duration) {
        let backends = self.snapshot();
        let mut probes = JoinSet::new();

        for backend in backends.iter().cloned() {
            probes.spawn(async move {
                let alive = probe::is_reachable(backend.url(), timeout).await;
                (backend, alive)
            });
        }

        while let Some(result) = probes.join_next().await {
            match result {
                Ok((backend, alive)) => record_probe(&backend, alive),
                Err(e) => tracing::error!(error = %e, "Health probe task failed"),
            }
        }
    }
}

fn record_probe(backend: &Backend, alive: bool) {
    let was_alive = backend.set_alive(alive);
    metrics::record_backend_health(backend.id(), alive);

    match (was_alive, alive) {
        (true, false) => tracing::warn!(backend = %backend.id(), "Backend is down"),
        (false, true) => tracing::info!(backend = %backend.id(), "Backend is up"),
        _ => {
            let status = if alive { "up" } else { "down" };
            tracing::debug!(backend = %backend.id(), status, "Health probe");
        }
    }
}

/// Build backend records for `urls`, in order.
///
/// Malformed entries are logged and skipped; the rest still load.
pub fn backends_from_urls(urls: &[String], client: &HttpClient) -> Vec<Arc<Backend>> {
    urls.iter()
        .filter_map(|raw| match Backend::parse(raw, client.clone()) {
            Ok(backend) => {
                tracing::info!(backend = %backend.id(), "Registered backend");
                Some(Arc::new(backend))
            }
            Err(e) => {
                tracing::error!(url = %raw, error = %e, "Invalid backend URL, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::http::upstream::build_client;
    use crate::load_balancer::backend::tests::test_backend;

    #[test]
    fn test_empty_pool_selects_nothing() {
        let pool = BackendPool::new();
        assert!(pool.next_peer().is_none());
        assert!(pool.least_connections().is_none());
    }

    #[test]
    fn test_add_and_clear() {
        let pool = BackendPool::new();
        pool.add_backend(test_backend("http://a"));
        pool.add_backend(test_backend("http://b"));
        assert_eq!(pool.len(), 2);
        assert!(pool.least_connections().is_some());

        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.next_peer().is_none());
    }

    #[test]
    fn test_least_connections_two_backends() {
        let pool = BackendPool::new();
        let a = test_backend("http://a");
        let b = test_backend("http://b");
        pool.add_backend(a.clone());
        pool.add_backend(b.clone());
        let _busy = [b.track(), b.track()];

        assert_eq!(pool.least_connections().unwrap().id(), a.id());
    }

    #[test]
    fn test_dead_backends_never_selected() {
        let pool = BackendPool::new();
        let a = test_backend("http://a");
        let b = test_backend("http://b");
        pool.add_backend(a.clone());
        pool.add_backend(b.clone());
        a.set_alive(false);

        for _ in 0..10 {
            assert_eq!(pool.next_peer().unwrap().id(), b.id());
            assert_eq!(pool.least_connections().unwrap().id(), b.id());
        }

        b.set_alive(false);
        assert!(pool.select(Strategy::RoundRobin).is_none());
        assert!(pool.select(Strategy::LeastConnections).is_none());
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let pool = BackendPool::new();
        pool.add_backend(test_backend("http://old"));
        let before = pool.snapshot();

        pool.replace(vec![test_backend("http://new1"), test_backend("http://new2")]);

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id(), "http://old");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.least_connections().unwrap().id(), "http://new1");
    }

    #[test]
    fn test_backends_from_urls_skips_invalid() {
        let client = build_client(&TimeoutConfig::default());
        let urls = vec![
            "http://localhost:8081".to_string(),
            "not a url".to_string(),
            "localhost:8083".to_string(),
            "http://localhost:8082".to_string(),
        ];
        let backends = backends_from_urls(&urls, &client);
        let ids: Vec<_> = backends.iter().map(|b| b.id().to_string()).collect();
        assert_eq!(ids, vec!["http://localhost:8081", "http://localhost:8082"]);
    }

    #[tokio::test]
    async fn test_health_check_marks_unreachable_dead() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap();

        // Bind and drop to get a port with nothing listening.
        let closed = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let pool = BackendPool::new();
        let alive = test_backend(&format!("http://{}", up));
        let dead = test_backend(&format!("http://{}", closed));
        pool.add_backend(alive.clone());
        pool.add_backend(dead.clone());

        let _guard = dead.track();
        pool.health_check(Duration::from_secs(2)).await;

        assert!(alive.is_alive());
        assert!(!dead.is_alive());
        // Probing never touches membership or connection counts.
        assert_eq!(pool.len(), 2);
        assert_eq!(dead.active_connections(), 1);
    }
}
