//!
//! tripgate HTTP server
//! --------------------
//! Axum application that fronts the web platform's pages with the authorization gate
//! and exposes the auth endpoints the pages call.
//!
//! Responsibilities:
//! - Gate middleware on every navigable path (static assets, API and auth endpoints excluded).
//! - Login / register actions that set the credential cookies and the unified session.
//! - OAuth hand-off: exchange a provider identity for the platform's own token pair.
//! - Unified session read (with refresh/resync) and explicit client-side updates.
//! - Logout clearing every cookie this service sets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::backend::{BackendClient, Upload};
use crate::config::GateConfig;
use crate::error::AppError;
use crate::identity::{
    authorization_gate, ActionResponse, AuthActions, AuthorizationGate, CookieTokenResolver, CredentialSessionStore,
    IdentityChain, LoginForm, ProviderSessionStore, RegisterForm, RoutePolicy, SessionRefresher, SessionUpdate,
    UnifiedSessionResolver,
};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub actions: AuthActions,
}

impl AppState {
    /// Wire the stores, the refresher and the identity chain (cookie first, then
    /// unified session) from configuration.
    pub fn from_config(config: &GateConfig) -> anyhow::Result<Self> {
        let backend = BackendClient::new(&config.backend_url, config.backend_timeout)?;
        let refresher = SessionRefresher::new(backend, config.jwt_secret.clone());
        let credentials = CredentialSessionStore::new(config.production);
        let sessions = ProviderSessionStore::new(config.session_secret.clone(), config.production);

        let chain = IdentityChain::new()
            .with(CookieTokenResolver::new(CredentialSessionStore::new(config.production), config.jwt_secret.clone()))
            .with(UnifiedSessionResolver::new(sessions.clone(), refresher.clone(), config.refresh_failure_policy));
        let gate = AuthorizationGate::new(chain, RoutePolicy::builtin().clone(), CredentialSessionStore::new(config.production));
        let actions = AuthActions::new(refresher, credentials, sessions, config.jwt_secret.clone());
        Ok(Self { gate: Arc::new(gate), actions })
    }
}

pub fn router(state: AppState) -> Router {
    let gate = state.gate.clone();
    Router::new()
        .route("/health", get(|| async { "tripgate ok" }))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/oauth/sync", post(oauth_sync))
        .route("/auth/session", get(get_session).post(update_session))
        .route("/auth/logout", post(logout))
        .fallback(page)
        .with_state(state)
        .layer(middleware::from_fn_with_state(gate, authorization_gate))
}

/// Start the HTTP server on `config.http_port`.
pub async fn run(config: GateConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "startup", "tripgate listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn status_of(code: u16) -> StatusCode { StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR) }

fn with_cookies(mut resp: Response, cookies: &HeaderMap) -> Response {
    for v in cookies.get_all(header::SET_COOKIE).iter() {
        resp.headers_mut().append(header::SET_COOKIE, v.clone());
    }
    resp
}

fn error_response(e: &AppError) -> Response {
    (status_of(e.http_status()), Json(json!({"success": false, "error": e}))).into_response()
}

/// Placeholder for page rendering; the gate already ran when this is reached.
async fn page(uri: Uri) -> impl IntoResponse {
    (StatusCode::OK, format!("page {}", uri.path()))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    redirect: Option<String>,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Response {
    let form = LoginForm { email: payload.email, password: payload.password, redirect: payload.redirect };
    let res = state.actions.login(&form).await;
    let (status, body) = ActionResponse::from_result(&res);
    let resp = (status_of(status), Json(body)).into_response();
    match &res {
        Ok(ok) => with_cookies(resp, &ok.set_cookies),
        Err(_) => resp,
    }
}

async fn register(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut form = RegisterForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(target: "auth", "bad multipart body: {}", e);
                return error_response(&AppError::validation("multipart", "malformed form data"));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            match field.bytes().await {
                Ok(bytes) if !bytes.is_empty() => {
                    form.file = Some(Upload {
                        file_name: file_name.unwrap_or_else(|| "upload".to_string()),
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "auth", "failed to read upload: {}", e);
                    return error_response(&AppError::validation("file", "could not read the selected file"));
                }
            }
            continue;
        }
        let text = match field.text().await {
            Ok(t) => t,
            Err(_) => return error_response(&AppError::validation("multipart", "malformed form data")),
        };
        match name.as_str() {
            "name" => form.name = text,
            "email" => form.email = text,
            "password" => form.password = text,
            "redirect" => form.redirect = Some(text),
            _ => {}
        }
    }
    let res = state.actions.register(form).await;
    let (status, body) = ActionResponse::from_result(&res);
    let resp = (status_of(status), Json(body)).into_response();
    match &res {
        Ok(ok) => with_cookies(resp, &ok.set_cookies),
        Err(_) => resp,
    }
}

#[derive(Debug, Deserialize)]
struct OAuthProfile {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

async fn oauth_sync(State(state): State<AppState>, Json(profile): Json<OAuthProfile>) -> Response {
    if profile.email.trim().is_empty() {
        return error_response(&AppError::validation("email", "provider did not supply an email"));
    }
    let refresher = state.actions.refresher();
    match refresher.sign_in_oauth(profile.email.trim(), profile.name.as_deref(), profile.image.as_deref(), Utc::now()).await {
        Ok(session) => {
            let mut cookies = HeaderMap::new();
            state.actions.sessions().write(&mut cookies, &session);
            let redirect = crate::identity::route_policy::default_dashboard(session.role.as_ref());
            let resp = Json(json!({"success": true, "redirect": redirect, "role": session.role})).into_response();
            with_cookies(resp, &cookies)
        }
        Err(e) => {
            warn!(target: "auth", email = %profile.email, "oauth sync failed: {}", e);
            error_response(&AppError::from(e))
        }
    }
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let sessions = state.actions.sessions();
    let Some(session) = sessions.read(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "unauthenticated"}))).into_response();
    };
    let resolved = state.actions.refresher().resolve(session, Utc::now()).await;
    let mut cookies = HeaderMap::new();
    if resolved.outcome.changed() {
        sessions.write(&mut cookies, &resolved.session);
    }
    with_cookies(Json(resolved.session.summary()).into_response(), &cookies)
}

async fn update_session(State(state): State<AppState>, headers: HeaderMap, Json(update): Json<SessionUpdate>) -> Response {
    let sessions = state.actions.sessions();
    let Some(mut session) = sessions.read(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "unauthenticated"}))).into_response();
    };
    let mut cookies = HeaderMap::new();
    if SessionRefresher::apply_update(&mut session, &update) {
        sessions.write(&mut cookies, &session);
    }
    with_cookies(Json(session.summary()).into_response(), &cookies)
}

async fn logout(State(state): State<AppState>) -> Response {
    let mut cookies = HeaderMap::new();
    state.actions.credentials().clear(&mut cookies);
    state.actions.sessions().clear(&mut cookies);
    with_cookies(Json(json!({"status": "ok"})).into_response(), &cookies)
}
