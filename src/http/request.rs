//! Request identification.
//!
//! # Responsibilities
//! - Reuse a client-supplied `X-Request-ID` or generate a new one
//! - Make the ID available to later layers through request extensions
//! - Echo the ID on every response
//!
//! # Design Decisions
//! - Generated IDs are UUID v4 in simple (32 hex digit) form
//! - Inbound IDs that are empty or not visible ASCII are replaced

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation ID of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(HeaderValue);

impl RequestId {
    pub fn generate() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        // Hex digits are always a valid header value.
        Self(HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("-")))
    }

    /// The inbound ID, if present and usable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(X_REQUEST_ID)
            .filter(|v| v.to_str().is_ok_and(|s| !s.trim().is_empty()))
            .cloned()
            .map(Self)
    }

    pub fn resolve(headers: &HeaderMap) -> Self {
        Self::from_headers(headers).unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or_default()
    }

    pub fn header_value(&self) -> HeaderValue {
        self.0.clone()
    }

    /// Set the ID on the request headers and extensions.
    pub fn attach(&self, request: &mut Request) {
        request.headers_mut().insert(X_REQUEST_ID, self.header_value());
        request.extensions_mut().insert(self.clone());
    }

    pub fn apply(&self, response: &mut Response) {
        response.headers_mut().insert(X_REQUEST_ID, self.header_value());
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension trait for reading the request ID.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for axum::http::Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Tag requests that bypass the main pipeline with an ID.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = RequestId::resolve(request.headers());
    id.attach(&mut request);
    let mut response = next.run(request).await;
    id.apply(&mut response);
    response
}
