//! Request abstraction: a read-only view with copy-on-write wrapping.

use crate::context::RequestContext;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Case-insensitive-lookup, order-preserving header map.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn norm(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&Self::norm(name)).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries.get(&Self::norm(name)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::norm(name))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(Self::norm(&name.into()), vec![value.into()]);
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(Self::norm(&name.into())).or_default().push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&Self::norm(name)).is_some()
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(values) = self.entries.remove(&Self::norm(from)) {
            self.entries.insert(Self::norm(to), values);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

/// The inner, immutable fields shared by a request and its wrappers.
#[derive(Debug)]
struct RequestInner {
    id: String,
    method: String,
    path: String,
    url: String,
    remote_addr: String,
    headers: Headers,
    body: Mutex<Option<Bytes>>,
}

/// A read-only HTTP request view (spec §3). Mutating a field produces a
/// wrapping `Request` whose other fields delegate to the original via `Arc`.
#[derive(Debug, Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
    context: RequestContext,
}

impl Request {
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        url: impl Into<String>,
        remote_addr: impl Into<String>,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: id.into(),
                method: method.into(),
                path: path.into(),
                url: url.into(),
                remote_addr: remote_addr.into(),
                headers,
                body: Mutex::new(Some(body)),
            }),
            context: RequestContext::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The remote address with any trailing `:port` stripped.
    pub fn remote_ip(&self) -> &str {
        match self.inner.remote_addr.rsplit_once(':') {
            Some((ip, _port)) => ip,
            None => &self.inner.remote_addr,
        }
    }

    pub fn remote_addr(&self) -> &str {
        &self.inner.remote_addr
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    /// Clones the body without consuming it. Intended for middlewares above
    /// the terminal handler that need to replay or inspect the body (retry,
    /// transform) — the one-shot-reader invariant applies to the terminal
    /// handler's read via [`take_body`](Self::take_body), not to these.
    pub fn body_bytes(&self) -> Bytes {
        self.inner
            .body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .expect("Request::body_bytes called after take_body")
    }

    /// Takes the body. Exactly one reader is permitted; a second call panics,
    /// since the invariant is a programmer error, not a runtime condition.
    pub fn take_body(&self) -> Bytes {
        self.inner
            .body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .expect("Request::take_body called more than once")
    }

    /// Produce a wrapped request with replacement headers; body and other
    /// fields delegate to the original.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: self.inner.id.clone(),
                method: self.inner.method.clone(),
                path: self.inner.path.clone(),
                url: self.inner.url.clone(),
                remote_addr: self.inner.remote_addr.clone(),
                headers,
                body: Mutex::new(
                    self.inner.body.lock().unwrap_or_else(|p| p.into_inner()).clone(),
                ),
            }),
            context: self.context.clone(),
        }
    }

    /// Produce a wrapped request with a replacement body; headers and other
    /// fields delegate to the original.
    pub fn with_body(&self, body: Bytes) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                id: self.inner.id.clone(),
                method: self.inner.method.clone(),
                path: self.inner.path.clone(),
                url: self.inner.url.clone(),
                remote_addr: self.inner.remote_addr.clone(),
                headers: self.inner.headers.clone(),
                body: Mutex::new(Some(body)),
            }),
            context: self.context.clone(),
        }
    }
}
