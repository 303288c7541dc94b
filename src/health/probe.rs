//! Backend reachability probe.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use url::{Host, Url};

/// Attempt a TCP connection to the backend's host and port.
///
/// Returns `true` only if the connection is established within `timeout`.
/// The connection is closed immediately.
pub async fn is_reachable(url: &Url, timeout: Duration) -> bool {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return false,
    };
    let Some(port) = url.port_or_known_default() else {
        return false;
    };

    matches!(
        time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        assert!(is_reachable(&url, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let url = Url::parse(&format!("http://{}", addr)).unwrap();
        assert!(!is_reachable(&url, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_unknown_scheme_without_port() {
        let url = Url::parse("unknown-scheme://example").unwrap();
        assert!(!is_reachable(&url, Duration::from_millis(100)).await);
    }
}
