//! Request pipeline layers, outermost first.
//!
//! ```text
//! request_log  → ID, count, time, access log
//! rate_limit   → 429 on an empty bucket (security::rate_limit)
//! dispatch     → select, track, forward (502 on failure or timeout)
//! ```

pub mod request_log;

pub use request_log::request_log_middleware;
