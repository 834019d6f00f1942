//! Request/response transformation middleware: path-pattern matched rules,
//! conditional application, never failing the request (spec §4.6).

use super::header::HeaderTransform;
use super::json::JsonTransform;
use crate::chain::{Handler, Middleware};
use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// An exact path or trailing-`*` wildcard pattern.
#[derive(Debug, Clone)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.0.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.0 == path,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransformCondition {
    HeaderExists { name: String, value: Option<String> },
    MethodEquals(String),
    ContentTypeContains(String),
}

fn request_satisfies(request: &Request, condition: &TransformCondition) -> bool {
    match condition {
        TransformCondition::HeaderExists { name, value } => match (request.headers().get(name), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        },
        TransformCondition::MethodEquals(method) => request.method().eq_ignore_ascii_case(method),
        TransformCondition::ContentTypeContains(needle) => request.headers().get("content-type").map(|ct| ct.contains(needle.as_str())).unwrap_or(false),
    }
}

fn is_json_content_type(headers: &crate::request::Headers) -> bool {
    headers.get("content-type").map(|ct| ct.contains("json")).unwrap_or(false)
}

/// One transform rule: the path it applies to, an optional gate of
/// conditions, and the header/body transforms to run.
#[derive(Debug, Clone, Default)]
pub struct TransformRule {
    pub conditions: Vec<TransformCondition>,
    pub headers: HeaderTransform,
    pub body: Option<JsonTransform>,
}

impl TransformRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: TransformCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_headers(mut self, headers: HeaderTransform) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: JsonTransform) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Default)]
pub struct TransformMiddlewareConfig {
    request_rules: Vec<(Pattern, TransformRule)>,
    response_rules: Vec<(Pattern, TransformRule)>,
    global_request: Option<TransformRule>,
    global_response: Option<TransformRule>,
}

impl TransformMiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_rule(mut self, pattern: impl Into<String>, rule: TransformRule) -> Self {
        self.request_rules.push((Pattern::new(pattern), rule));
        self
    }

    pub fn with_response_rule(mut self, pattern: impl Into<String>, rule: TransformRule) -> Self {
        self.response_rules.push((Pattern::new(pattern), rule));
        self
    }

    pub fn with_global_request(mut self, rule: TransformRule) -> Self {
        self.global_request = Some(rule);
        self
    }

    pub fn with_global_response(mut self, rule: TransformRule) -> Self {
        self.global_response = Some(rule);
        self
    }

    fn select_request_rule(&self, path: &str) -> Option<&TransformRule> {
        self.request_rules.iter().find(|(p, _)| p.matches(path)).map(|(_, r)| r).or(self.global_request.as_ref())
    }

    fn select_response_rule(&self, path: &str) -> Option<&TransformRule> {
        self.response_rules.iter().find(|(p, _)| p.matches(path)).map(|(_, r)| r).or(self.global_response.as_ref())
    }
}

fn transform_request(rule: &TransformRule, request: &Request) -> Request {
    let new_headers = rule.headers.apply(request.headers());
    let wrapped = request.with_headers(new_headers.clone());

    let Some(body_transform) = &rule.body else {
        return wrapped;
    };
    if !is_json_content_type(&new_headers) {
        return wrapped;
    }

    let body = request.body_bytes();
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(parsed) => {
            let transformed = body_transform.apply(parsed);
            match serde_json::to_vec(&transformed) {
                Ok(bytes) => wrapped.with_body(bytes::Bytes::from(bytes)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to re-marshal transformed request body, forwarding original");
                    wrapped
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse request body as JSON, forwarding original");
            wrapped
        }
    }
}

fn transform_response(rule: &TransformRule, response: &Response) -> Response {
    let new_headers = rule.headers.apply(response.headers());
    let wrapped = response.with_headers(new_headers.clone());

    let Some(body_transform) = &rule.body else {
        return wrapped;
    };
    if !is_json_content_type(&new_headers) {
        return wrapped;
    }

    match serde_json::from_slice::<serde_json::Value>(response.body()) {
        Ok(parsed) => {
            let transformed = body_transform.apply(parsed);
            match serde_json::to_vec(&transformed) {
                Ok(bytes) => wrapped.with_body(bytes::Bytes::from(bytes)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to re-marshal transformed response body, forwarding original");
                    wrapped
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse response body as JSON, forwarding original");
            wrapped
        }
    }
}

/// Builds the transform middleware. Transformation never fails the request:
/// parse/marshal errors are logged and the original value is forwarded.
pub fn transform_middleware(config: Arc<TransformMiddlewareConfig>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let config = config.clone();
        let next = next.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
            let config = config.clone();
            let next = next.clone();
            async move {
                let path = request.path().to_string();

                let request = match config.select_request_rule(&path) {
                    Some(rule) if rule.conditions.iter().all(|c| request_satisfies(&request, c)) => transform_request(rule, &request),
                    _ => request,
                };

                let response = next.handle(request).await?;

                let response = match config.select_response_rule(&path) {
                    Some(rule) => transform_response(rule, &response),
                    None => response,
                };

                Ok(response)
            }
        });
        handler
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Headers;
    use bytes::Bytes;
    use regex::Regex;
    use serde_json::json;

    fn req(path: &str, ct: Option<&str>, body: &str) -> Request {
        let mut h = Headers::new();
        if let Some(ct) = ct {
            h.insert("content-type", ct);
        }
        Request::new("r1", "POST", path, "http://h", "1.1.1.1:1", h, Bytes::from(body.to_string()))
    }

    #[tokio::test]
    async fn applies_header_and_json_body_transform_to_matching_request() {
        let rule = TransformRule::new()
            .with_headers(HeaderTransform::new().add("x-added", "1"))
            .with_body(super::super::json::JsonTransform::new().add("extra", json!(true)));
        let config = Arc::new(TransformMiddlewareConfig::new().with_request_rule("/api/*", rule));
        let mw = transform_middleware(config);

        let captured = Arc::new(std::sync::Mutex::new(None));
        let captured2 = captured.clone();
        let terminal: Arc<dyn Handler> = Arc::new(move |req: Request| {
            let captured = captured2.clone();
            async move {
                *captured.lock().unwrap() = Some((req.headers().get("x-added").map(String::from), req.body_bytes()));
                Ok(Response::new(200, Headers::new(), Bytes::new()))
            }
        });
        let handler = mw(terminal);
        let resp = handler.handle(req("/api/x", Some("application/json"), r#"{"a":1}"#)).await.unwrap();
        assert_eq!(resp.status(), 200);

        let (header, body) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(header, Some("1".to_string()));
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["extra"], json!(true));
        assert_eq!(parsed["a"], json!(1));
    }

    #[tokio::test]
    async fn non_json_content_type_skips_body_transform() {
        let rule = TransformRule::new().with_body(super::super::json::JsonTransform::new().add("extra", json!(true)));
        let config = Arc::new(TransformMiddlewareConfig::new().with_request_rule("/x", rule));
        let mw = transform_middleware(config);

        let captured = Arc::new(std::sync::Mutex::new(None));
        let captured2 = captured.clone();
        let terminal: Arc<dyn Handler> = Arc::new(move |req: Request| {
            let captured = captured2.clone();
            async move {
                *captured.lock().unwrap() = Some(req.body_bytes());
                Ok(Response::new(200, Headers::new(), Bytes::new()))
            }
        });
        let handler = mw(terminal);
        let _ = handler.handle(req("/x", Some("text/plain"), "raw")).await.unwrap();
        assert_eq!(captured.lock().unwrap().clone().unwrap().as_ref(), b"raw");
    }

    #[tokio::test]
    async fn unmatched_path_bypasses_transform() {
        let rule = TransformRule::new().with_headers(HeaderTransform::new().add("x-added", "1"));
        let config = Arc::new(TransformMiddlewareConfig::new().with_request_rule("/api/*", rule));
        let mw = transform_middleware(config);
        let terminal: Arc<dyn Handler> = Arc::new(|req: Request| async move { Ok(Response::new(200, req.headers().clone(), Bytes::new())) });
        let handler = mw(terminal);
        let resp = handler.handle(req("/public", None, "")).await.unwrap();
        assert!(resp.headers().get("x-added").is_none());
    }

    #[tokio::test]
    async fn failing_condition_skips_the_rule() {
        let rule = TransformRule::new()
            .with_condition(TransformCondition::HeaderExists { name: "x-flag".to_string(), value: None })
            .with_headers(HeaderTransform::new().add("x-added", "1"));
        let config = Arc::new(TransformMiddlewareConfig::new().with_request_rule("/x", rule));
        let mw = transform_middleware(config);
        let terminal: Arc<dyn Handler> = Arc::new(|req: Request| async move { Ok(Response::new(200, req.headers().clone(), Bytes::new())) });
        let handler = mw(terminal);
        let resp = handler.handle(req("/x", None, "")).await.unwrap();
        assert!(resp.headers().get("x-added").is_none(), "rule with an unsatisfied condition should be skipped entirely");
    }

    #[test]
    fn modify_header_regex_integrates_with_transform_rule() {
        let rule = TransformRule::new().with_headers(HeaderTransform::new().modify("x-id", Regex::new(r"\d").unwrap()));
        let mut h = Headers::new();
        h.insert("x-id", "a1b2");
        let applied = rule.headers.apply(&h);
        assert_eq!(applied.get("x-id"), Some("ab"));
    }
}
