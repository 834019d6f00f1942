//! Response abstraction, mirroring the wrapping discipline of `Request`.

use crate::request::Headers;
use bytes::Bytes;
use std::sync::Arc;

#[derive(Debug)]
struct ResponseInner {
    status: u16,
    headers: Headers,
    body: Bytes,
}

/// A read-only HTTP response view (spec §3).
#[derive(Debug, Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: Bytes) -> Self {
        Self { inner: Arc::new(ResponseInner { status, headers, body }) }
    }

    pub fn status(&self) -> u16 {
        self.inner.status
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    pub fn with_headers(&self, headers: Headers) -> Self {
        Self { inner: Arc::new(ResponseInner { status: self.inner.status, headers, body: self.inner.body.clone() }) }
    }

    pub fn with_body(&self, body: Bytes) -> Self {
        Self { inner: Arc::new(ResponseInner { status: self.inner.status, headers: self.inner.headers.clone(), body }) }
    }

    /// Whether this status counts as a server-side failure for the circuit
    /// breaker / retry classifiers (5xx, excluding the handful treated
    /// specially by each classifier).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.inner.status)
    }
}
