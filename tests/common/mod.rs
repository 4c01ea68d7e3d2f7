//! Shared fixtures for the integration tests: a gate wired against a wiremock backend,
//! token/session builders and response helpers.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use tower::ServiceExt;
use wiremock::MockServer;

use tripgate::config::{GateConfig, RefreshFailurePolicy};
use tripgate::identity::token::{self, ACCESS_TOKEN_TTL_SECS};
use tripgate::identity::{ProviderSessionStore, Role, Session, SESSION_COOKIE};
use tripgate::server::{router, AppState};

pub const SECRET: &str = "integration-secret";

pub fn config_for(server: &MockServer) -> GateConfig {
    GateConfig::for_backend(server.uri(), SECRET)
}

pub fn state_for(server: &MockServer) -> AppState {
    AppState::from_config(&config_for(server)).expect("state")
}

pub fn state_with_policy(server: &MockServer, policy: RefreshFailurePolicy) -> AppState {
    AppState::from_config(&config_for(server).with_refresh_failure_policy(policy)).expect("state")
}

pub fn access_token(id: &str, role: Role) -> String {
    token::issue(id, &role, None, ACCESS_TOKEN_TTL_SECS, SECRET).expect("sign")
}

pub fn session_store() -> ProviderSessionStore { ProviderSessionStore::new(SECRET, false) }

pub fn session(id: &str, role: Role, now: DateTime<Utc>) -> Session {
    Session {
        subject_id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        role: Some(role.clone()),
        premium: false,
        subscription_type: None,
        display_name: Some("Traveller".into()),
        avatar_url: None,
        access_token: access_token(id, role),
        refresh_token: Some("refresh-1".into()),
        access_token_expires_at: now + Duration::minutes(50),
        last_profile_sync_at: now,
        error: None,
    }
}

pub fn session_cookie(s: &Session) -> String {
    format!("{}={}", SESSION_COOKIE, session_store().encode(s).expect("encode session"))
}

pub async fn get(state: AppState, path: &str, cookie: Option<&str>) -> Response {
    let mut req = Request::builder().method("GET").uri(path);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    router(state).oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

pub fn location(resp: &Response) -> Option<String> {
    resp.headers().get(header::LOCATION).map(|v| v.to_str().unwrap().to_string())
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers.get_all(header::SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_string()).collect()
}

/// Value of `name` among the response's `Set-Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    set_cookies(headers).into_iter().find_map(|c| {
        let pair = c.split(';').next()?.to_string();
        let (k, v) = pair.split_once('=')?;
        if k == name { Some(v.to_string()) } else { None }
    })
}

pub fn session_from_response(headers: &HeaderMap) -> Option<Session> {
    let raw = cookie_value(headers, SESSION_COOKIE)?;
    session_store().decode(&raw)
}

pub async fn read_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
