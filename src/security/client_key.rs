//! Client key derivation for per-client rate limiting and access logs.
//!
//! [`ForwardedHeaders`] trusts `X-Forwarded-For` and `X-Real-IP`
//! unconditionally. Deploy it only behind proxies that set those headers;
//! otherwise configure [`PeerAddress`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::ClientKeySource;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// The resolved client key, stored in request extensions so later layers
/// reuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy that maps a request to its client key.
pub trait KeyExtractor: Send + Sync + fmt::Debug {
    fn client_key(&self, headers: &HeaderMap, peer: SocketAddr) -> ClientKey;
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardedHeaders;

impl KeyExtractor for ForwardedHeaders {
    fn client_key(&self, headers: &HeaderMap, peer: SocketAddr) -> ClientKey {
        let forwarded = header_str(headers, X_FORWARDED_FOR)
            .and_then(|list| list.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ClientKey(ip.to_owned());
        }

        if let Some(ip) = header_str(headers, X_REAL_IP)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return ClientKey(ip.to_owned());
        }

        PeerAddress.client_key(headers, peer)
    }
}

/// The transport peer address without its port.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerAddress;

impl KeyExtractor for PeerAddress {
    fn client_key(&self, _headers: &HeaderMap, peer: SocketAddr) -> ClientKey {
        ClientKey(peer.ip().to_string())
    }
}

pub fn extractor_for(source: ClientKeySource) -> Arc<dyn KeyExtractor> {
    match source {
        ClientKeySource::ForwardedHeaders => Arc::new(ForwardedHeaders),
        ClientKeySource::PeerAddress => Arc::new(PeerAddress),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
