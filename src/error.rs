//! Unified error taxonomy shared across the middleware boundary.

use std::collections::HashMap;
use std::fmt;

/// The kind of failure a [`GatewayError`] represents.
///
/// HTTP status mapping is the server's responsibility, but the convention
/// each kind maps to is fixed: bad-request->400, unauthorized->401,
/// forbidden->403, not-found->404, rate-limit->429, timeout->504,
/// unavailable->503, internal->500.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimit,
    Timeout,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// The conventional HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimit => 429,
            ErrorKind::Timeout => 504,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Client-fault kinds the circuit breaker must not count as instance
    /// failures (spec §4.3.1).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ErrorKind::BadRequest | ErrorKind::Unauthorized | ErrorKind::Forbidden | ErrorKind::NotFound
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A single tagged error carrying kind, message, free-form details, and an
/// optional wrapped cause (spec §7).
#[derive(Debug)]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: HashMap<String, String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: HashMap::new(), cause: None }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Rate-limit denial carrying the key (spec §4.2 middleware failure semantics).
    pub fn rate_limited(key: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, "rate limit exceeded").with_detail("key", key)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Circuit breaker open: {circuit_breaker:"open", key} per spec §4.3.
    pub fn circuit_open(key: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, "circuit breaker open")
            .with_detail("circuit_breaker", "open")
            .with_detail("key", key)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Non-retryable, non-failure-counting kinds per spec §4.3.1.
    pub fn is_retryable_kind(&self) -> bool {
        !self.kind.is_client_fault() && self.kind != ErrorKind::RateLimit
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}
