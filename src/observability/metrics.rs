//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count requests and rate-limit rejections
//! - Record request latency in a fixed-bucket histogram
//! - Render a text exposition for the `/metrics` endpoint
//! - Publish per-backend gauges through the `metrics` facade
//!
//! # Metrics
//! - `<prefix>_requests_total` (counter): every request seen by the pipeline
//! - `<prefix>_rate_limited_total` (counter): requests rejected with 429
//! - `<prefix>_request_duration_seconds` (histogram): latency distribution
//! - `edgecore_backend_up` (gauge, facade): 1=alive, 0=dead
//! - `edgecore_upstream_errors_total` (counter, facade): failed forwards
//!
//! # Design Decisions
//! - Registry is an injected instance, never a global
//! - Updates are relaxed atomic increments
//! - Latency sum is kept in whole microseconds

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::config::ObservabilityConfig;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub const DEFAULT_PREFIX: &str = "edgecore";

pub const DEFAULT_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Fixed-boundary latency histogram.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds: Vec<f64>,
    /// One slot per bound plus the overflow slot.
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl LatencyHistogram {
    /// `bounds` must be ascending; configuration validation guarantees it.
    pub fn new(bounds: Vec<f64>) -> Self {
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let slot = self
            .bounds
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(self.bounds.len());

        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            counts: self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
            sum_micros: self.sum_micros.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`LatencyHistogram`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: Vec<f64>,
    /// Per-slot counts, non-cumulative. The last slot is the overflow.
    pub counts: Vec<u64>,
    pub sum_micros: u64,
    pub count: u64,
}

impl HistogramSnapshot {
    /// Running totals per slot; the last entry is the `+Inf` bucket.
    pub fn cumulative(&self) -> Vec<u64> {
        self.counts
            .iter()
            .scan(0u64, |total, c| {
                *total += c;
                Some(*total)
            })
            .collect()
    }

    pub fn sum_seconds(&self) -> f64 {
        self.sum_micros as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub rate_limited_total: u64,
    pub latency: HistogramSnapshot,
}

/// Process-wide request metrics.
///
/// Created once at startup and shared by `Arc`. Counters are never reset.
#[derive(Debug)]
pub struct ProxyMetrics {
    prefix: String,
    requests_total: AtomicU64,
    rate_limited_total: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_BUCKETS.to_vec())
    }
}

impl ProxyMetrics {
    pub fn new(prefix: impl Into<String>, buckets: Vec<f64>) -> Self {
        Self {
            prefix: prefix.into(),
            requests_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            latency: LatencyHistogram::new(buckets),
        }
    }

    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::new(config.metrics_prefix.clone(), config.latency_buckets.clone())
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, elapsed: Duration) {
        self.latency.observe(elapsed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }

    /// Render the current values in the text exposition format.
    pub fn render(&self) -> String {
        let snapshot = self.snapshot();
        let prefix = &self.prefix;
        let mut out = String::with_capacity(1024);

        // Writing into a String cannot fail.
        let _ = writeln!(out, "# HELP {prefix}_requests_total Total requests received.");
        let _ = writeln!(out, "# TYPE {prefix}_requests_total counter");
        let _ = writeln!(out, "{prefix}_requests_total {}", snapshot.requests_total);

        let _ = writeln!(
            out,
            "# HELP {prefix}_rate_limited_total Requests rejected by rate limiting."
        );
        let _ = writeln!(out, "# TYPE {prefix}_rate_limited_total counter");
        let _ = writeln!(out, "{prefix}_rate_limited_total {}", snapshot.rate_limited_total);

        let histogram = &snapshot.latency;
        let name = format!("{prefix}_request_duration_seconds");
        let cumulative = histogram.cumulative();
        let _ = writeln!(out, "# HELP {name} Request latency in seconds.");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bound, count) in histogram.bounds.iter().zip(&cumulative) {
            let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {count}");
        }
        let total = cumulative.last().copied().unwrap_or(0);
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {total}");
        let _ = writeln!(out, "{name}_sum {:.6}", histogram.sum_seconds());
        let _ = writeln!(out, "{name}_count {}", histogram.count);

        out
    }
}

/// Publish a backend's liveness to the installed recorder, if any.
pub fn record_backend_health(backend: &str, alive: bool) {
    metrics::gauge!("edgecore_backend_up", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

pub fn record_upstream_error(backend: &str) {
    metrics::counter!("edgecore_upstream_errors_total", "backend" => backend.to_string())
        .increment(1);
}

/// Install the Prometheus recorder and serve it on `address`.
///
/// Without this call the facade helpers above are no-ops.
pub fn init_exporter(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(address = %address, "Metrics exporter listening");
    Ok(())
}
