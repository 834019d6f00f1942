//! Bearer-token extraction and multi-provider validation middleware
//! (spec §4.5, "Middleware").

use super::{Claims, Oauth2Provider};
use crate::chain::{Handler, Middleware};
use crate::context::ContextKey;
use crate::error::GatewayError;
use crate::request::Request;
use std::sync::Arc;

/// Where to look for the bearer token, tried in configured order; the
/// first non-empty result wins.
#[derive(Debug, Clone)]
pub enum TokenLocation {
    Header(String),
    Query(String),
    Cookie(String),
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

fn extract_token(request: &Request, locations: &[TokenLocation], bearer_prefix: &str) -> Option<String> {
    for location in locations {
        let found = match location {
            TokenLocation::Header(name) => request.headers().get(name).map(|v| v.strip_prefix(bearer_prefix).unwrap_or(v).to_string()),
            TokenLocation::Query(name) => query_param(request.url(), name),
            TokenLocation::Cookie(name) => request.headers().get("cookie").and_then(|c| cookie_value(c, name)),
        };
        if let Some(token) = found {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    None
}

pub struct Oauth2MiddlewareConfig {
    pub providers: Vec<Arc<Oauth2Provider>>,
    pub token_locations: Vec<TokenLocation>,
    pub bearer_prefix: String,
    pub required_scopes: Vec<String>,
    pub required_audiences: Vec<String>,
    pub context_key: ContextKey,
}

impl Oauth2MiddlewareConfig {
    pub fn new(providers: Vec<Arc<Oauth2Provider>>) -> Self {
        Self {
            providers,
            token_locations: vec![TokenLocation::Header("authorization".to_string())],
            bearer_prefix: "Bearer ".to_string(),
            required_scopes: Vec::new(),
            required_audiences: Vec::new(),
            context_key: ContextKey::Claims,
        }
    }

    /// Builds a middleware config from the wire `TokenExtractionConfig`,
    /// carrying its configurable bearer prefix through instead of the
    /// hardcoded default (spec §6).
    pub fn with_token_extraction(mut self, extraction: &crate::config::TokenExtractionConfig) -> Self {
        let mut locations = Vec::new();
        if let Some(header) = &extraction.token_header {
            locations.push(TokenLocation::Header(header.clone()));
        }
        if let Some(query) = &extraction.token_query {
            locations.push(TokenLocation::Query(query.clone()));
        }
        if let Some(cookie) = &extraction.token_cookie {
            locations.push(TokenLocation::Cookie(cookie.clone()));
        }
        if !locations.is_empty() {
            self.token_locations = locations;
        }
        self.bearer_prefix = extraction.bearer_prefix.clone();
        self
    }

    fn satisfies_requirements(&self, claims: &Claims) -> bool {
        let scopes_ok = self.required_scopes.iter().all(|s| claims.has_scope(s));
        let audiences_ok = self.required_audiences.is_empty() || claims.has_any_audience(&self.required_audiences);
        scopes_ok && audiences_ok
    }
}

pub fn oauth2_middleware(config: Arc<Oauth2MiddlewareConfig>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let config = config.clone();
        let next = next.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |mut request: Request| {
            let config = config.clone();
            let next = next.clone();
            async move {
                let token = extract_token(&request, &config.token_locations, &config.bearer_prefix).ok_or_else(|| GatewayError::unauthorized("no bearer token found"))?;

                let mut last_error: Option<GatewayError> = None;
                let mut valid_claims: Option<Claims> = None;
                for provider in &config.providers {
                    match provider.validate_token(&token).await {
                        Ok(claims) => {
                            valid_claims = Some(claims);
                            break;
                        }
                        Err(err) => last_error = Some(err),
                    }
                }

                let claims = match valid_claims {
                    Some(claims) => claims,
                    None => {
                        let mut err = GatewayError::unauthorized("no provider accepted the token");
                        if let Some(cause) = last_error {
                            err = err.with_cause(cause);
                        }
                        return Err(err);
                    }
                };

                if !config.satisfies_requirements(&claims) {
                    tracing::debug!(subject = ?claims.subject, "token missing required scopes or audiences");
                    return Err(GatewayError::unauthorized("insufficient scope or audience"));
                }

                request.context_mut().insert(config.context_key, claims);
                next.handle(request).await
            }
        });
        handler
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::Oauth2ProviderConfig;
    use crate::request::Headers;
    use bytes::Bytes;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        scope: String,
    }

    fn token() -> String {
        let claims = TestClaims { sub: "u1".into(), exp: chrono::Utc::now().timestamp() + 3600, scope: "read".into() };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"shh")).unwrap()
    }

    fn provider() -> Arc<Oauth2Provider> {
        Arc::new(Oauth2Provider::new(Oauth2ProviderConfig { client_secret: Some("shh".to_string()), ..Default::default() }))
    }

    #[test]
    fn extracts_bearer_token_stripping_prefix() {
        let mut h = Headers::new();
        h.insert("authorization", "Bearer abc123");
        let req = Request::new("r1", "GET", "/x", "http://h/x", "1.1.1.1:1", h, Bytes::new());
        let locations = vec![TokenLocation::Header("authorization".to_string())];
        assert_eq!(extract_token(&req, &locations, "Bearer "), Some("abc123".to_string()));
    }

    #[test]
    fn extracts_token_with_custom_prefix() {
        let mut h = Headers::new();
        h.insert("authorization", "Token abc123");
        let req = Request::new("r1", "GET", "/x", "http://h/x", "1.1.1.1:1", h, Bytes::new());
        let locations = vec![TokenLocation::Header("authorization".to_string())];
        assert_eq!(extract_token(&req, &locations, "Token "), Some("abc123".to_string()));
    }

    #[test]
    fn extracts_token_from_query_param() {
        let req = Request::new("r1", "GET", "/x", "http://h/x?access_token=qtok", "1.1.1.1:1", Headers::new(), Bytes::new());
        let locations = vec![TokenLocation::Query("access_token".to_string())];
        assert_eq!(extract_token(&req, &locations, "Bearer "), Some("qtok".to_string()));
    }

    #[test]
    fn extracts_token_from_cookie() {
        let mut h = Headers::new();
        h.insert("cookie", "session=abc; access_token=ctok; other=1");
        let req = Request::new("r1", "GET", "/x", "http://h/x", "1.1.1.1:1", h, Bytes::new());
        let locations = vec![TokenLocation::Cookie("access_token".to_string())];
        assert_eq!(extract_token(&req, &locations, "Bearer "), Some("ctok".to_string()));
    }

    #[tokio::test]
    async fn middleware_attaches_claims_to_context_on_success() {
        let config = Arc::new(Oauth2MiddlewareConfig::new(vec![provider()]));
        let mw = oauth2_middleware(config);

        let seen_claims = Arc::new(std::sync::Mutex::new(None));
        let seen_claims2 = seen_claims.clone();
        let terminal: Arc<dyn Handler> = Arc::new(move |req: Request| {
            let seen_claims = seen_claims2.clone();
            async move {
                *seen_claims.lock().unwrap() = req.context().get::<Claims>(ContextKey::Claims).map(|c| c.subject.clone());
                Ok(crate::response::Response::new(200, Headers::new(), Bytes::new()))
            }
        });
        let handler = mw(terminal);

        let mut h = Headers::new();
        h.insert("authorization", format!("Bearer {}", token()));
        let req = Request::new("r1", "GET", "/x", "http://h/x", "1.1.1.1:1", h, Bytes::new());
        let resp = handler.handle(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(seen_claims.lock().unwrap().clone().flatten(), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn middleware_rejects_missing_token() {
        let config = Arc::new(Oauth2MiddlewareConfig::new(vec![provider()]));
        let mw = oauth2_middleware(config);
        let terminal: Arc<dyn Handler> = Arc::new(|_req: Request| async { Ok(crate::response::Response::new(200, Headers::new(), Bytes::new())) });
        let handler = mw(terminal);
        let req = Request::new("r1", "GET", "/x", "http://h/x", "1.1.1.1:1", Headers::new(), Bytes::new());
        let err = handler.handle(req).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Unauthorized);
    }
}
