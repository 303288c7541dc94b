//! Upstream forwarding.
//!
//! # Responsibilities
//! - Build the shared pooled HTTP client
//! - Rewrite an inbound request for one backend and send it
//! - Strip hop-by-hop headers in both directions
//! - Bound the wait for the response head by the request timeout
//! - Keep the backend's connection count held until the body is done
//! - Translate transport failures and timeouts into 502 responses
//!
//! # Design Decisions
//! - One client for all backends; connections are pooled per host
//! - Upstream requests are always HTTP/1.1
//! - The inbound `Host` header is passed through unchanged

use std::net::IpAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        uri::InvalidUri,
        Request, Response, StatusCode, Uri, Version,
    },
    response::IntoResponse,
};
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use thiserror::Error;
use tokio::time;
use url::{Position, Url};

use crate::config::TimeoutConfig;
use crate::load_balancer::backend::BackendConnectionGuard;
use crate::observability::metrics;

pub type HttpClient = Client<HttpConnector, Body>;

/// Idle pooled connections kept per backend host.
pub const MAX_IDLE_PER_HOST: usize = 100;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single transport hop and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URI: {0}")]
    InvalidUri(#[from] InvalidUri),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

/// The backend that served a response, attached as a response extension.
#[derive(Debug, Clone)]
pub struct UpstreamTarget(pub String);

/// Build the pooled client shared by every backend.
pub fn build_client(timeouts: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build(connector)
}

/// Forwarding handle for one backend.
#[derive(Clone, Debug)]
pub struct Upstream {
    target: Url,
    client: HttpClient,
}

impl Upstream {
    pub fn new(target: Url, client: HttpClient) -> Self {
        Self { target, client }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Relay `request` to this backend and return its response.
    ///
    /// `client_ip` is appended to `X-Forwarded-For`. The response head must
    /// arrive within `timeout`. The returned body owns `guard`, so the
    /// connection stays counted until the body finishes or is dropped.
    pub async fn forward(
        &self,
        request: Request<Body>,
        client_ip: IpAddr,
        timeout: Duration,
        guard: BackendConnectionGuard,
    ) -> Result<Response<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = upstream_uri(&self.target, &parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, client_ip);

        let response: Response<Incoming> =
            time::timeout(timeout, self.client.request(Request::from_parts(parts, body)))
                .await
                .map_err(|_| UpstreamError::Timeout(timeout))??;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(TrackedBody::new(body, guard))))
    }
}

/// An upstream response body that holds its backend's connection slot.
///
/// The slot is released at end of stream, on a body error, or on drop.
#[derive(Debug)]
pub struct TrackedBody {
    inner: Incoming,
    guard: Option<BackendConnectionGuard>,
}

impl TrackedBody {
    pub fn new(inner: Incoming, guard: BackendConnectionGuard) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        let this = self.get_mut();
        let frame = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(frame, Poll::Ready(None | Some(Err(_)))) {
            this.guard = None;
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Error hook for failed forwards: log with the backend identity and
/// answer 502.
pub fn on_error(backend: &str, error: &UpstreamError) -> Response<Body> {
    tracing::warn!(backend = %backend, error = %error, "Upstream request failed");
    metrics::record_upstream_error(backend);
    (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
}

/// Combine the backend base URL with the inbound path and query.
fn upstream_uri(target: &Url, inbound: &Uri) -> Result<Uri, InvalidUri> {
    let mut uri = String::from(&target[..Position::BeforePath]);
    uri.push_str(&join_paths(target.path(), inbound.path()));

    let query = match (
        target.query().filter(|q| !q.is_empty()),
        inbound.query().filter(|q| !q.is_empty()),
    ) {
        (Some(base), Some(extra)) => Some(format!("{base}&{extra}")),
        (Some(q), None) | (None, Some(q)) => Some(q.to_owned()),
        (None, None) => None,
    };
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(&query);
    }

    uri.parse()
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers listed in Connection are hop-by-hop too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(target: &str, inbound: &str) -> String {
        let target = Url::parse(target).unwrap();
        let inbound: Uri = inbound.parse().unwrap();
        upstream_uri(&target, &inbound).unwrap().to_string()
    }

    #[test]
    fn test_upstream_uri_joins_paths() {
        assert_eq!(uri("http://127.0.0.1:8081", "/a/b"), "http://127.0.0.1:8081/a/b");
        assert_eq!(uri("http://127.0.0.1:8081/", "/"), "http://127.0.0.1:8081/");
        assert_eq!(uri("http://h:1/api", "/users"), "http://h:1/api/users");
        assert_eq!(uri("http://h:1/api/", "/users"), "http://h:1/api/users");
    }

    #[test]
    fn test_upstream_uri_merges_queries() {
        assert_eq!(uri("http://h:1", "/s?q=1"), "http://h:1/s?q=1");
        assert_eq!(uri("http://h:1/?k=v", "/s"), "http://h:1/s?k=v");
        assert_eq!(uri("http://h:1/?k=v", "/s?q=1"), "http://h:1/s?k=v&q=1");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_append_forwarded_for() {
        let ip: IpAddr = "192.0.2.7".parse().unwrap();

        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, ip);
        assert_eq!(headers[&X_FORWARDED_FOR], "192.0.2.7");

        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.1"));
        append_forwarded_for(&mut headers, ip);
        assert_eq!(headers[&X_FORWARDED_FOR], "203.0.113.1, 192.0.2.7");
    }

    #[test]
    fn test_on_error_is_bad_gateway() {
        let err = UpstreamError::InvalidUri("".parse::<Uri>().unwrap_err());
        let response = on_error("http://a", &err);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_timeout_is_bad_gateway() {
        let err = UpstreamError::Timeout(Duration::from_secs(1));
        assert_eq!(err.to_string(), "upstream did not respond within 1s");
        assert_eq!(on_error("http://a", &err).status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unanswered_forward_times_out_and_releases() {
        use crate::load_balancer::backend::tests::test_backend;

        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _held = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let backend = test_backend(&format!("http://{}", addr));
        let request = Request::get("/").body(Body::empty()).unwrap();
        let result = backend
            .upstream()
            .forward(
                request,
                "127.0.0.1".parse().unwrap(),
                Duration::from_millis(200),
                backend.track(),
            )
            .await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
        assert_eq!(backend.active_connections(), 0);
    }
}
