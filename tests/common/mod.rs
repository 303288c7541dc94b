//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use axum::Router;
use edgecore::config::ProxyConfig;
use edgecore::http::{AppState, HttpServer};
use edgecore::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a backend that answers every request with `name`.
///
/// The response carries `x-backend` plus the request ID and forwarded-for
/// values the backend received.
pub async fn start_backend(name: &'static str) -> SocketAddr {
    start_slow_backend(name, Duration::ZERO).await
}

/// Like [`start_backend`], but waits `delay` before answering.
pub async fn start_slow_backend(name: &'static str, delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move |headers: HeaderMap| async move {
        tokio::time::sleep(delay).await;

        let mut out = HeaderMap::new();
        out.insert("x-backend", HeaderValue::from_static(name));
        if let Some(id) = headers.get("x-request-id") {
            out.insert("x-seen-request-id", id.clone());
        }
        if let Some(xff) = headers.get("x-forwarded-for") {
            out.insert("x-seen-forwarded-for", xff.clone());
        }
        (out, name)
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a backend that sends its headers and first body byte at once,
/// then trickles the remaining `len - 1` bytes one per `interval`.
pub async fn start_trickle_backend(len: usize, interval: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let start = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\nx", len);
                if socket.write_all(start.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 1..len {
                    tokio::time::sleep(interval).await;
                    if socket.write_all(b"x").await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Config for `backends` with health checks off.
pub fn config_for(backends: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.backends = backends.iter().map(|a| format!("http://{}", a)).collect();
    config.health_check.enabled = false;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    start_server(HttpServer::new(config)).await
}

pub async fn start_server(server: HttpServer) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestProxy {
        addr,
        state,
        shutdown,
        handle,
    }
}

/// A client without connection reuse or environment proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
