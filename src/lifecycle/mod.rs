//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Bind listener → Spawn background tasks → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload (reload.rs)
//! ```
//!
//! # Design Decisions
//! - Listener binds before any traffic-facing task starts
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: remaining connections are dropped after the grace period

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use reload::{ReloadTrigger, Reloader};
pub use shutdown::Shutdown;
