//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Jittered start, then periodic timer
//!     → BackendPool::health_check sweeps the current snapshot
//!     → probe.rs (TCP connect with timeout) per backend
//!     → Backend liveness flag set to the probe outcome
//! ```
//!
//! # Design Decisions
//! - A failed probe only flips liveness; it never removes a backend
//! - Health state is per-backend and reset when a reload replaces it
//! - The scheduler stops on the shutdown signal

pub mod active;
pub mod probe;

pub use active::HealthMonitor;
