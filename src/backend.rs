//! HTTP client for the REST backend that owns accounts and issues tokens.
//!
//! Every call carries the configured timeout. Status and transport failures come back
//! as [`BackendError`]; callers decide whether that is a user-facing error or a
//! silent fallback.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::identity::Role;

const USER_AGENT_VALUE: &str = concat!("tripgate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Network(String),
    #[error("backend request timed out")]
    Timeout,
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Account fields as the backend reports them on login and on `GET /user/:id`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    #[serde(alias = "_id", default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub role: Option<Role>,
    /// Absent when the backend omits it; a profile read then leaves the session's flag alone.
    #[serde(default)]
    pub premium: Option<bool>,
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: BackendUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Optional avatar attached to a registration.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    pub file: Option<Upload>,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> BackendResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    /// `POST /auth/login`
    pub async fn login(&self, email: &str, password: &str) -> BackendResult<TokenPair> {
        debug!(target: "backend", email = %email, "login");
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await?;
        read_json(resp).await
    }

    /// `POST /auth/login/google`: provisions the account on first sight.
    pub async fn login_google(&self, email: &str, name: Option<&str>, image: Option<&str>) -> BackendResult<TokenPair> {
        debug!(target: "backend", email = %email, "oauth sync");
        let resp = self
            .client
            .post(self.url("/auth/login/google"))
            .json(&serde_json::json!({"email": email, "name": name, "image": image}))
            .send()
            .await?;
        read_json(resp).await
    }

    /// `POST /auth/refresh-token` bearing the refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> BackendResult<RefreshedTokens> {
        let resp = self
            .client
            .post(self.url("/auth/refresh-token"))
            .bearer_auth(refresh_token)
            .send()
            .await?;
        read_json(resp).await
    }

    /// `GET /user/:id` bearing the access token.
    pub async fn fetch_profile(&self, user_id: &str, access_token: &str) -> BackendResult<BackendUser> {
        let path = format!("/user/{}", urlencoding::encode(user_id));
        let resp = self.client.get(self.url(&path)).bearer_auth(access_token).send().await?;
        read_json(resp).await
    }

    /// `POST /user/register` as multipart. `file` is always present; an empty string
    /// stands in for "no image" so the backend's upload parser takes the same route.
    pub async fn register(&self, payload: &RegisterPayload) -> BackendResult<BackendUser> {
        let form = Form::new()
            .text("name", payload.name.clone())
            .text("email", payload.email.clone())
            .text("password", payload.password.clone());
        let form = match &payload.file {
            Some(up) => {
                let mut part = Part::bytes(up.bytes.clone()).file_name(up.file_name.clone());
                if let Some(ct) = &up.content_type {
                    part = part.mime_str(ct).map_err(|e| BackendError::Decode(e.to_string()))?;
                }
                form.part("file", part)
            }
            None => form.text("file", String::new()),
        };
        debug!(target: "backend", email = %payload.email, has_file = payload.file.is_some(), "register");
        let resp = self.client.post(self.url("/user/register")).multipart(form).send().await?;
        read_json(resp).await
    }
}

/// Decode a success body, unwrapping the `{success, message, data}` envelope when present.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> BackendResult<T> {
    let status = resp.status();
    let body: Value = match resp.bytes().await {
        Ok(b) if b.is_empty() => Value::Null,
        Ok(b) => serde_json::from_slice(&b).unwrap_or(Value::Null),
        Err(e) => return Err(e.into()),
    };
    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
            .to_string();
        return Err(BackendError::Rejected { status: status.as_u16(), message });
    }
    let inner = match body {
        Value::Object(mut m) if m.get("data").map(|d| d.is_object()).unwrap_or(false) => m.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| BackendError::Decode(e.to_string()))
}
