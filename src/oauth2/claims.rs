//! Validated OAuth2/OIDC claims (spec §3, "Claims").

use serde_json::Value;
use std::collections::HashMap;

/// Standard JWT + OIDC claims plus authorization arrays and a raw map of
/// every original claim entry.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Vec<String>,
    pub expiration: Option<i64>,
    pub not_before: Option<i64>,
    pub issued_at: Option<i64>,
    pub jti: Option<String>,
    pub scopes: Vec<String>,
    pub groups: Vec<String>,
    pub roles: Vec<String>,
    pub custom: HashMap<String, Value>,
    pub raw: HashMap<String, Value>,
}

impl Claims {
    /// Builds claims from a decoded JWT payload, applying the configured
    /// claims mapping (spec §4.5 step 5): `scope` is split on whitespace,
    /// `groups`/`roles` coerced from string arrays, and each
    /// `(from, to)` pair in `mapping` copies `raw[from]` into `custom[to]`.
    pub fn from_payload(payload: &Value, mapping: &[(String, String)]) -> Self {
        let mut claims = Claims::default();
        let obj = match payload.as_object() {
            Some(obj) => obj,
            None => return claims,
        };

        claims.raw = obj.clone().into_iter().collect();
        claims.issuer = str_field(obj, "iss");
        claims.subject = str_field(obj, "sub");
        claims.jti = str_field(obj, "jti");
        claims.expiration = int_field(obj, "exp");
        claims.not_before = int_field(obj, "nbf");
        claims.issued_at = int_field(obj, "iat");
        claims.audience = audience_list(obj.get("aud"));

        if let Some(scope) = obj.get("scope").and_then(Value::as_str) {
            claims.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
        claims.groups = string_array(obj.get("groups"));
        claims.roles = string_array(obj.get("roles"));

        for (from, to) in mapping {
            if let Some(v) = obj.get(from) {
                claims.custom.insert(to.clone(), v.clone());
            }
        }

        claims
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_any_audience(&self, allowed: &[String]) -> bool {
        allowed.is_empty() || self.audience.iter().any(|a| allowed.iter().any(|b| b == a))
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn int_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

fn audience_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
