//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed by the balancer as a value object
//!
//! On reload signal:
//!     SIGHUP or watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → pool snapshot and limiter are swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BalancerConfig, ClientKeySource, HealthCheckConfig, LimiterConfig, LimiterScope,
    ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, RateLimitSettings, Strategy,
    TimeoutConfig,
};
