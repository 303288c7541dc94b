//! Traffic shaping subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (derive the client key)
//!     → rate_limit.rs (global or per-client token bucket)
//!         → rejected: 429
//!         → admitted: pass to dispatch
//! ```
//!
//! # Design Decisions
//! - Buckets refill lazily; no timers
//! - Each bucket has its own lock; the per-client registry lock is held
//!   only for lookup/insert
//! - Header-based client keys assume trusted proxies in front

pub mod client_key;
pub mod rate_limit;
pub mod token_bucket;

pub use client_key::{ClientKey, KeyExtractor};
pub use rate_limit::{rate_limit_middleware, Limiter};
pub use token_bucket::{KeyedLimiter, TokenBucket};
