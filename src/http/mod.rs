//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, reserved paths)
//!     → middleware/request_log.rs (request ID, metrics, access log)
//!     → security::rate_limit (429 on exhaustion)
//!     → server.rs dispatch (select backend, track connection)
//!     → upstream.rs (rewrite and forward, 502 on failure)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;
pub mod state;
pub mod upstream;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
pub use state::{AppState, TrafficPolicy};
