//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces:
//!     → logging.rs (one structured access log entry per request)
//!     → metrics.rs (counters and latency histogram)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → /metrics endpoint (pull-based text exposition)
//!     → optional Prometheus exporter for per-backend series
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the request log into forwarded requests
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use metrics::ProxyMetrics;
