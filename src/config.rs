//! Runtime configuration for the gate, loaded from `TRIPGATE_*` environment variables.

use std::time::Duration;

use thiserror::Error;

/// What the gate does with a unified session whose last refresh failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// Keep honoring the cached role; later backend calls fail on their own.
    #[default]
    Degrade,
    /// Treat the session as unauthenticated and send the user to the login page.
    ForceLogin,
}

impl RefreshFailurePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "degrade" => Some(Self::Degrade),
            "force_login" | "force-login" => Some(Self::ForceLogin),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct GateConfig {
    pub http_port: u16,
    /// Base URL of the REST backend, without trailing slash (e.g. `http://localhost:5000/api/v1`).
    pub backend_url: String,
    /// Shared HS256 secret used by the backend to sign access tokens.
    pub jwt_secret: String,
    /// Secret for the unified session cookie.
    pub session_secret: String,
    /// Adds `Secure` to every cookie we set.
    pub production: bool,
    pub backend_timeout: Duration,
    pub refresh_failure_policy: RefreshFailurePolicy,
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("http_port", &self.http_port)
            .field("backend_url", &self.backend_url)
            .field("jwt_secret", &"<redacted>")
            .field("session_secret", &"<redacted>")
            .field("production", &self.production)
            .field("backend_timeout", &self.backend_timeout)
            .field("refresh_failure_policy", &self.refresh_failure_policy)
            .finish()
    }
}

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/api/v1";

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup so tests do not have to mutate the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_port = match get("TRIPGATE_HTTP_PORT") {
            Some(v) => v.parse::<u16>().map_err(|_| ConfigError::Invalid { name: "TRIPGATE_HTTP_PORT", value: v })?,
            None => 3000,
        };
        let backend_url = get("TRIPGATE_BACKEND_URL")
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let jwt_secret = get("TRIPGATE_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("TRIPGATE_JWT_SECRET"))?;
        let session_secret = get("TRIPGATE_SESSION_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());
        let production = match get("TRIPGATE_PRODUCTION") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid { name: "TRIPGATE_PRODUCTION", value: v })?,
            None => false,
        };
        let backend_timeout = match get("TRIPGATE_BACKEND_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse::<u64>().map_err(|_| ConfigError::Invalid { name: "TRIPGATE_BACKEND_TIMEOUT_SECS", value: v })?,
            ),
            None => Duration::from_secs(10),
        };
        let refresh_failure_policy = match get("TRIPGATE_REFRESH_FAILURE_POLICY") {
            Some(v) => RefreshFailurePolicy::parse(&v)
                .ok_or(ConfigError::Invalid { name: "TRIPGATE_REFRESH_FAILURE_POLICY", value: v })?,
            None => RefreshFailurePolicy::default(),
        };
        Ok(Self { http_port, backend_url, jwt_secret, session_secret, production, backend_timeout, refresh_failure_policy })
    }

    /// Minimal configuration pointing at a (usually mocked) backend.
    pub fn for_backend(backend_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        let jwt_secret = jwt_secret.into();
        Self {
            http_port: 0,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            session_secret: jwt_secret.clone(),
            jwt_secret,
            production: false,
            backend_timeout: Duration::from_secs(5),
            refresh_failure_policy: RefreshFailurePolicy::Degrade,
        }
    }

    pub fn with_refresh_failure_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.refresh_failure_policy = policy;
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
