//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.
//!
//! The top-level keys (`backends`, `port`, `rate_limit`, `burst`) form the
//! operator-facing core; the nested sections tune everything around it.

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Ordered list of upstream URLs (e.g. "http://127.0.0.1:8081").
    pub backends: Vec<String>,

    /// Port the proxy listens on.
    pub port: u16,

    /// Sustained rate limit in tokens per second.
    pub rate_limit: f64,

    /// Token bucket capacity (burst size).
    pub burst: f64,

    /// Listener settings.
    pub listener: ListenerConfig,

    /// Backend selection policy.
    pub balancer: BalancerConfig,

    /// Rate limiter scope and client key policy.
    pub limiter: LimiterConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Hot reload settings.
    pub reload: ReloadConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            port: 8080,
            rate_limit: 100.0,
            burst: 50.0,
            listener: ListenerConfig::default(),
            balancer: BalancerConfig::default(),
            limiter: LimiterConfig::default(),
            health_check: HealthCheckConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
            reload: ReloadConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Socket address string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listener.bind_host, self.port)
    }

    /// Everything the rate limiter is built from.
    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            enabled: self.limiter.enabled,
            scope: self.limiter.scope,
            rate: self.rate_limit,
            burst: self.burst,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
        }
    }
}

/// Backend selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    LeastConnections,
    RoundRobin,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    pub strategy: Strategy,
}

/// Whether one bucket guards all traffic or each client gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    #[default]
    Global,
    PerClient,
}

/// How the client key is derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientKeySource {
    /// Trust `X-Forwarded-For` / `X-Real-IP` set by upstream proxies.
    #[default]
    ForwardedHeaders,
    /// Always use the transport peer address.
    PeerAddress,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Global bucket or one bucket per client key.
    pub scope: LimiterScope,

    /// Client key derivation policy.
    pub client_key: ClientKeySource,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: LimiterScope::Global,
            client_key: ClientKeySource::ForwardedHeaders,
        }
    }
}

/// The parameters a limiter is built from; compared on reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub scope: LimiterScope,
    pub rate: f64,
    pub burst: f64,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Probe connect timeout in seconds.
    pub timeout_secs: u64,

    /// Upper bound of the random delay before the first sweep.
    pub initial_jitter_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 2,
            initial_jitter_ms: 1000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Idle pooled upstream connection timeout in seconds.
    pub idle_secs: u64,

    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 90,
            shutdown_grace_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Prefix of every metric name on `/metrics`.
    pub metrics_prefix: String,

    /// Latency histogram upper bounds in seconds, ascending.
    pub latency_buckets: Vec<f64>,

    /// Optional bind address of the per-backend Prometheus exporter.
    /// Empty disables it.
    pub exporter_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_prefix: "edgecore".to_string(),
            latency_buckets: vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            exporter_address: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReloadConfig {
    /// Reload when the config file changes on disk, in addition to SIGHUP.
    pub watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_json_document() {
        let raw = r#"{
            "backends": ["http://localhost:8081", "http://localhost:8082"],
            "port": 9000,
            "rate_limit": 10,
            "burst": 20
        }"#;
        let config: ProxyConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.port, 9000);
        assert_eq!(config.rate_limit, 10.0);
        assert_eq!(config.burst, 20.0);
        assert_eq!(config.balancer.strategy, Strategy::LeastConnections);
        assert_eq!(config.health_check.interval_secs, 30);
    }

    #[test]
    fn test_toml_sections() {
        let raw = r#"
            backends = ["http://a:1"]
            port = 8000

            [balancer]
            strategy = "round_robin"

            [limiter]
            scope = "per_client"
            client_key = "peer_address"

            [observability]
            log_format = "json"
        "#;
        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.balancer.strategy, Strategy::RoundRobin);
        assert_eq!(config.limiter.scope, LimiterScope::PerClient);
        assert_eq!(config.limiter.client_key, ClientKeySource::PeerAddress);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }
}
