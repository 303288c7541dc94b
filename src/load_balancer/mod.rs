//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted by the rate limiter
//!     → pool.rs (load the current backend snapshot)
//!     → Apply load balancing algorithm:
//!         - least_conn.rs (pick backend with fewest connections)
//!         - round_robin.rs (rotate through backends, skipping dead ones)
//!     → backend.rs (connection guard wraps the forwarding call)
//!     → Return backend or none
//! ```
//!
//! # Design Decisions
//! - Algorithms are stateless apart from the round-robin cursor
//! - Dead backends are excluded from selection, never removed
//! - A reload publishes a new snapshot in a single atomic swap

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

pub use backend::{Backend, BackendConnectionGuard};
pub use pool::BackendPool;

/// A backend selection algorithm over one pool snapshot.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick an alive backend, or `None` if there is none.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
