//! OAuth2/OIDC provider: discovery, JWKS-backed token validation, and the
//! authorization-flow helper calls (spec §4.5).

mod claims;
mod jwks;
mod middleware;

pub use claims::Claims;
pub use jwks::JwksCache;
pub use middleware::{oauth2_middleware, Oauth2MiddlewareConfig, TokenLocation};

use crate::clock::{Clock, MonotonicClock};
use crate::error::GatewayError;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often discovery is re-fetched once `use_discovery` is set (spec §4.5: "more than one hour").
pub const DISCOVERY_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Oauth2ProviderConfig {
    pub issuer_url: Option<String>,
    pub use_discovery: bool,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub allowed_audiences: Vec<String>,
    pub claims_mapping: Vec<(String, String)>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
}

impl Default for Oauth2ProviderConfig {
    fn default() -> Self {
        Self {
            issuer_url: None,
            use_discovery: false,
            client_id: String::new(),
            client_secret: None,
            validate_issuer: true,
            validate_audience: false,
            allowed_audiences: Vec::new(),
            claims_mapping: Vec::new(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_uri: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

/// Whether discovery should be refreshed given the last successful fetch time.
fn needs_discovery_refresh(last_millis: u64, now_millis: u64, interval: Duration) -> bool {
    now_millis.saturating_sub(last_millis) >= interval.as_millis() as u64
}

pub struct Oauth2Provider {
    config: Oauth2ProviderConfig,
    discovery: RwLock<DiscoveryDocument>,
    jwks: JwksCache,
    http: reqwest::Client,
    last_discovery_millis: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Oauth2Provider {
    pub fn new(config: Oauth2ProviderConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: Oauth2ProviderConfig, clock: Arc<dyn Clock>) -> Self {
        let discovery = DiscoveryDocument {
            issuer: config.issuer_url.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            userinfo_endpoint: config.userinfo_endpoint.clone(),
            jwks_uri: config.jwks_uri.clone(),
        };
        Self {
            config,
            discovery: RwLock::new(discovery),
            jwks: JwksCache::new(),
            http: reqwest::Client::new(),
            last_discovery_millis: AtomicU64::new(0),
            clock,
        }
    }

    /// Fetches `{issuer}/.well-known/openid-configuration` and overlays it
    /// onto the current discovery document, filling in the issuer if it was
    /// previously unset (spec §4.5).
    pub async fn refresh_discovery(&self) -> Result<(), GatewayError> {
        let issuer = self
            .config
            .issuer_url
            .clone()
            .or_else(|| self.discovery.read().issuer.clone())
            .ok_or_else(|| GatewayError::internal("discovery requires an issuer URL"))?;
        let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| GatewayError::internal("discovery fetch failed").with_cause(err))?;
        let doc: DiscoveryDocument =
            response.json().await.map_err(|err| GatewayError::internal("discovery response decode failed").with_cause(err))?;

        let mut current = self.discovery.write();
        if current.issuer.is_none() {
            current.issuer = doc.issuer;
        }
        current.authorization_endpoint = doc.authorization_endpoint.or(current.authorization_endpoint.take());
        current.token_endpoint = doc.token_endpoint.or(current.token_endpoint.take());
        current.userinfo_endpoint = doc.userinfo_endpoint.or(current.userinfo_endpoint.take());
        current.jwks_uri = doc.jwks_uri.or(current.jwks_uri.take());
        drop(current);

        self.last_discovery_millis.store(self.clock.now_millis(), Ordering::SeqCst);
        Ok(())
    }

    /// Re-runs discovery if `use_discovery` is set and more than
    /// [`DISCOVERY_REFRESH_INTERVAL`] has elapsed since the last success.
    pub async fn maybe_refresh_discovery(&self) -> Result<(), GatewayError> {
        if !self.config.use_discovery {
            return Ok(());
        }
        let last = self.last_discovery_millis.load(Ordering::SeqCst);
        if last == 0 || needs_discovery_refresh(last, self.clock.now_millis(), DISCOVERY_REFRESH_INTERVAL) {
            self.refresh_discovery().await?;
        }
        Ok(())
    }

    fn jwks_uri(&self) -> Option<String> {
        self.discovery.read().jwks_uri.clone()
    }

    async fn resolve_key(&self, kid: &str) -> Result<DecodingKey, GatewayError> {
        if let Some(key) = self.jwks.get(kid) {
            return Ok(key);
        }
        let uri = self.jwks_uri().ok_or_else(|| GatewayError::unauthorized("no JWKS endpoint configured"))?;
        self.jwks.refresh_if_not_in_flight(&self.http, &uri).await?;
        self.jwks.get(kid).ok_or_else(|| GatewayError::unauthorized(format!("unknown key id '{}'", kid)))
    }

    /// Validates a bearer token per spec §4.5's five-step algorithm.
    pub async fn validate_token(&self, token: &str) -> Result<Claims, GatewayError> {
        let header = decode_header(token).map_err(|err| GatewayError::unauthorized("invalid token header").with_cause(err))?;

        let key = match header.alg {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::ES256 | Algorithm::ES384 => {
                let kid = header.kid.ok_or_else(|| GatewayError::unauthorized("token missing kid header"))?;
                self.resolve_key(&kid).await?
            }
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = self.config.client_secret.as_deref().ok_or_else(|| GatewayError::unauthorized("no client secret configured for HMAC token"))?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            other => return Err(GatewayError::unauthorized(format!("unexpected signing method {:?}", other))),
        };

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        if self.config.validate_issuer {
            if let Some(issuer) = &self.config.issuer_url {
                validation.set_issuer(&[issuer.clone()]);
            }
        } else {
            validation.iss = None;
        }

        let token_data = decode::<Value>(token, &key, &validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
            match err.kind() {
                JwtErrorKind::ExpiredSignature => GatewayError::unauthorized("token expired"),
                JwtErrorKind::ImmatureSignature => GatewayError::unauthorized("token not yet valid"),
                JwtErrorKind::InvalidIssuer => GatewayError::unauthorized("token issuer mismatch"),
                _ => GatewayError::unauthorized("token verification failed").with_cause(err),
            }
        })?;

        let claims = Claims::from_payload(&token_data.claims, &self.config.claims_mapping);

        if self.config.validate_audience && !claims.has_any_audience(&self.config.allowed_audiences) {
            return Err(GatewayError::unauthorized("token audience not allowed"));
        }

        Ok(claims)
    }

    /// Builds an authorization-code front-channel URL (spec §4.5).
    pub fn authorize_url(&self, redirect_uri: &str, state: &str, scopes: &[String]) -> Result<String, GatewayError> {
        let endpoint = self.discovery.read().authorization_endpoint.clone().ok_or_else(|| GatewayError::internal("no authorization endpoint configured"))?;
        let mut url = url::Url::parse(&endpoint).map_err(|err| GatewayError::internal("invalid authorization endpoint").with_cause(err))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &scopes.join(" "));
        Ok(url.to_string())
    }

    /// Exchanges an authorization code for tokens (spec §4.5).
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse, GatewayError> {
        let endpoint = self.discovery.read().token_endpoint.clone().ok_or_else(|| GatewayError::internal("no token endpoint configured"))?;
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.config.client_id),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret));
        }
        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|err| GatewayError::internal("token exchange request failed").with_cause(err))?;
        response.json().await.map_err(|err| GatewayError::internal("token exchange response decode failed").with_cause(err))
    }

    /// Fetches the userinfo endpoint with the given bearer access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, GatewayError> {
        let endpoint = self.discovery.read().userinfo_endpoint.clone().ok_or_else(|| GatewayError::internal("no userinfo endpoint configured"))?;
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| GatewayError::internal("userinfo request failed").with_cause(err))?;
        response.json().await.map_err(|err| GatewayError::internal("userinfo response decode failed").with_cause(err))
    }
}
