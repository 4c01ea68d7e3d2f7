//! Access-token codec: HS256 verification and role extraction.
//!
//! `verify` is pure. Any error it returns means "not authenticated through this
//! token" and nothing more; callers log it and move on.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use super::principal::Role;

/// Lifetime of an access token as issued by the backend.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    pub role: Role,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("signature verification failed")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no role claim")]
    MissingRole,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::Signature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

fn validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.set_required_spec_claims(&["exp"]);
    v.leeway = 0;
    v
}

/// Verify `token` against `secret` and extract its claims.
pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let data = decode::<Value>(token, &key, &validation())?;
    let Value::Object(payload) = data.claims else {
        return Err(TokenError::NotAnObject);
    };
    claims_from_payload(&payload)
}

fn claims_from_payload(payload: &Map<String, Value>) -> Result<Claims, TokenError> {
    let role = payload
        .get("role")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(Role::from)
        .ok_or(TokenError::MissingRole)?;
    // Backend tokens use `id`; standard `sub` is accepted too.
    let subject_id = ["id", "sub", "userId"]
        .iter()
        .find_map(|k| payload.get(*k))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    Ok(Claims {
        subject_id,
        role,
        issued_at: payload.get("iat").and_then(|v| v.as_i64()),
        expires_at: payload.get("exp").and_then(|v| v.as_i64()),
        email: payload.get("email").and_then(|v| v.as_str()).map(str::to_string),
    })
}

/// Sign an access token for `subject_id`/`role`, valid for `ttl_secs` from now.
pub fn issue(subject_id: &str, role: &Role, email: Option<&str>, ttl_secs: i64, secret: &str) -> Result<String, TokenError> {
    let now = Utc::now().timestamp();
    let mut payload = Map::new();
    payload.insert("id".into(), Value::String(subject_id.to_string()));
    payload.insert("role".into(), Value::String(role.as_str().to_string()));
    if let Some(e) = email {
        payload.insert("email".into(), Value::String(e.to_string()));
    }
    payload.insert("iat".into(), Value::from(now));
    payload.insert("exp".into(), Value::from(now + ttl_secs));
    encode(&Header::new(Algorithm::HS256), &Value::Object(payload), &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| TokenError::Malformed(e.to_string()))
}
