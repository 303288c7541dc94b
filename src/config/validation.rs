//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require at least one backend entry
//! - Validate value ranges (port, rate, burst, intervals, timeouts, histogram bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Malformed backend URLs are not rejected here; the pool skips them

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,
    #[error("invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u16),
    #[error("rate_limit must be >= 0")]
    NegativeRate,
    #[error("burst must be >= 0")]
    NegativeBurst,
    #[error("health_check.interval_secs must be > 0")]
    ZeroHealthInterval,
    #[error("health_check.timeout_secs must be > 0")]
    ZeroHealthTimeout,
    #[error("timeouts.connect_secs must be > 0")]
    ZeroConnectTimeout,
    #[error("timeouts.request_secs must be > 0")]
    ZeroRequestTimeout,
    #[error("observability.latency_buckets must be non-empty, finite and strictly ascending")]
    InvalidLatencyBuckets,
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    if config.port == 0 {
        errors.push(ValidationError::InvalidPort(config.port));
    }
    if config.rate_limit.is_nan() || config.rate_limit < 0.0 {
        errors.push(ValidationError::NegativeRate);
    }
    if config.burst.is_nan() || config.burst < 0.0 {
        errors.push(ValidationError::NegativeBurst);
    }
    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::ZeroHealthInterval);
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::ZeroHealthTimeout);
        }
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let buckets = &config.observability.latency_buckets;
    let ascending = buckets.windows(2).all(|w| w[0] < w[1]);
    if buckets.is_empty() || !ascending || buckets.iter().any(|b| !b.is_finite()) {
        errors.push(ValidationError::InvalidLatencyBuckets);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
