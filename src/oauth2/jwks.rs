//! JWKS fetch + cache with kid-based lookup and single-flight refresh
//! debounce, mirroring the pack's JWKS bearer-provider discipline
//! (SPEC_FULL §B).

use crate::error::GatewayError;
use jsonwebtoken::DecodingKey;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
    crv: Option<String>,
}

fn decode_key(jwk: &Jwk) -> Result<DecodingKey, GatewayError> {
    let kty = jwk.kty.as_deref().unwrap_or("RSA");
    match kty {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| GatewayError::internal("JWKS RSA key missing 'n'"))?;
            let e = jwk.e.as_deref().ok_or_else(|| GatewayError::internal("JWKS RSA key missing 'e'"))?;
            DecodingKey::from_rsa_components(n, e).map_err(|err| GatewayError::internal("invalid RSA JWKS key").with_cause(err))
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| GatewayError::internal("JWKS EC key missing 'x'"))?;
            let y = jwk.y.as_deref().ok_or_else(|| GatewayError::internal("JWKS EC key missing 'y'"))?;
            let _crv = jwk.crv.as_deref().unwrap_or("P-256");
            DecodingKey::from_ec_components(x, y).map_err(|err| GatewayError::internal("invalid EC JWKS key").with_cause(err))
        }
        other => Err(GatewayError::internal(format!("unsupported JWKS key type '{}'", other))),
    }
}

/// Fetches and parses a JWKS document into a kid-keyed map of decoding keys.
pub async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<HashMap<String, DecodingKey>, GatewayError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| GatewayError::internal("JWKS fetch failed").with_cause(err))?;

    if !response.status().is_success() {
        return Err(GatewayError::internal(format!("JWKS endpoint returned HTTP {}", response.status())));
    }

    let body: JwkSet = response.json().await.map_err(|err| GatewayError::internal("JWKS response decode failed").with_cause(err))?;

    let mut keys = HashMap::new();
    for jwk in &body.keys {
        let kid = match &jwk.kid {
            Some(kid) => kid.clone(),
            None => continue,
        };
        if let Some(alg) = &jwk.alg {
            if !matches!(alg.as_str(), "RS256" | "RS384" | "RS512" | "ES256" | "ES384") {
                continue;
            }
        }
        keys.insert(kid, decode_key(jwk)?);
    }
    Ok(keys)
}

/// kid -> key cache with a single-flight refresh debounce: concurrent
/// callers that observe a cache miss while a refresh is already in flight
/// wait for it rather than each issuing their own fetch.
pub struct JwksCache {
    keys: RwLock<HashMap<String, DecodingKey>>,
    refreshing: AtomicBool,
}

impl JwksCache {
    pub fn new() -> Self {
        Self { keys: RwLock::new(HashMap::new()), refreshing: AtomicBool::new(false) }
    }

    pub fn get(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().get(kid).cloned()
    }

    pub fn replace_all(&self, keys: HashMap<String, DecodingKey>) {
        *self.keys.write() = keys;
    }

    /// Refreshes from `url` unless another caller is already refreshing, in
    /// which case this call is a no-op and returns `Ok(false)`.
    pub async fn refresh_if_not_in_flight(&self, client: &reqwest::Client, url: &str) -> Result<bool, GatewayError> {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = fetch_jwks(client, url).await;
        self.refreshing.store(false, Ordering::Release);
        match result {
            Ok(keys) => {
                self.replace_all(keys);
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}
