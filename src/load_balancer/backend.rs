//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server
//! - Track active connections (for Least Connections LB)
//! - Track liveness as reported by health probes
//! - Own the forwarding handle used to relay requests

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

use crate::http::upstream::{HttpClient, Upstream};

/// A single backend server.
///
/// The address never changes; a reload replaces the whole record.
#[derive(Debug)]
pub struct Backend {
    /// Stable identifier used in logs and metrics labels.
    id: String,
    /// Set only by health checks. New backends start alive.
    alive: AtomicBool,
    /// Requests currently being forwarded to this backend.
    active_connections: AtomicUsize,
    /// Forwarding handle.
    upstream: Upstream,
}

impl Backend {
    /// Create a new backend for the given upstream URL.
    pub fn new(url: Url, client: HttpClient) -> Self {
        let id = url.as_str().trim_end_matches('/').to_string();
        Self {
            id,
            alive: AtomicBool::new(true),
            active_connections: AtomicUsize::new(0),
            upstream: Upstream::new(url, client),
        }
    }

    /// Parse `raw` and create a backend for it.
    ///
    /// The URL must name a host; `localhost:8081` parses as a scheme and is
    /// rejected.
    pub fn parse(raw: &str, client: HttpClient) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw)?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(url::ParseError::EmptyHost);
        }
        Ok(Self::new(url, client))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        self.upstream.target()
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Set liveness, returning the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Count a request against this backend until the returned guard drops.
    pub fn track(self: &Arc<Self>) -> BackendConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        BackendConnectionGuard {
            backend: Arc::clone(self),
        }
    }
}

/// A RAII guard that manages the active connection count.
///
/// Dropping it releases the slot exactly once, including during unwinding.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
