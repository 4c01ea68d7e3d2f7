//! Unified session: one signed cookie that carries the same logical fields for OAuth
//! and credentials users alike.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cookies::{clear_cookie, parse_cookie, set_cookie, REFRESH_COOKIE_MAX_AGE_SECS};
use super::principal::Role;

pub const SESSION_COOKIE: &str = "tripgate.session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub subject_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub access_token_expires_at: DateTime<Utc>,
    pub last_profile_sync_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.access_token_expires_at <= now }

    /// Fields safe to hand to the browser: no tokens.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.subject_id,
            "email": self.email,
            "role": self.role,
            "premium": self.premium,
            "subscriptionType": self.subscription_type,
            "name": self.display_name,
            "image": self.avatar_url,
            "error": self.error,
        })
    }
}

/// Partial profile edit pushed by the client; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "image")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub premium: Option<bool>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar_url.is_none() && self.premium.is_none() && self.subscription_type.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    sess: Session,
    iat: i64,
    exp: i64,
}

/// Reads and writes the unified session cookie (HS256-signed, 90 days).
#[derive(Clone)]
pub struct ProviderSessionStore {
    secret: String,
    secure: bool,
}

impl ProviderSessionStore {
    pub fn new(secret: impl Into<String>, secure: bool) -> Self { Self { secret: secret.into(), secure } }

    /// Decode the session cookie. A missing, tampered or expired cookie is simply no session.
    pub fn read(&self, headers: &HeaderMap) -> Option<Session> {
        let raw = parse_cookie(headers, SESSION_COOKIE)?;
        self.decode(&raw)
    }

    pub fn decode(&self, raw: &str) -> Option<Session> {
        let mut v = Validation::new(Algorithm::HS256);
        v.set_required_spec_claims(&["exp"]);
        match decode::<SessionEnvelope>(raw, &DecodingKey::from_secret(self.secret.as_bytes()), &v) {
            Ok(data) => Some(data.claims.sess),
            Err(e) => {
                debug!(target: "session", "unified session cookie rejected: {}", e);
                None
            }
        }
    }

    pub fn encode(&self, session: &Session) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let env = SessionEnvelope { sess: session.clone(), iat: now, exp: now + REFRESH_COOKIE_MAX_AGE_SECS };
        encode(&Header::new(Algorithm::HS256), &env, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    /// Append the `Set-Cookie` header for `session`. Encoding failures are logged and skipped.
    pub fn write(&self, out: &mut HeaderMap, session: &Session) {
        match self.encode(session) {
            Ok(tok) => {
                out.append(header::SET_COOKIE, set_cookie(SESSION_COOKIE, &tok, REFRESH_COOKIE_MAX_AGE_SECS, self.secure));
            }
            Err(e) => tracing::error!(target: "session", "failed to encode unified session: {}", e),
        }
    }

    pub fn clear(&self, out: &mut HeaderMap) {
        out.append(header::SET_COOKIE, clear_cookie(SESSION_COOKIE));
    }
}
