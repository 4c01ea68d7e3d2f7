//! Server-side login and registration flows.
//!
//! Both validate input before touching the network and report problems as data:
//! field-keyed validation errors, or one [`AppError`] for auth/network failures.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::cookies::CredentialSessionStore;
use super::principal::Role;
use super::refresher::SessionRefresher;
use super::route_policy::{default_dashboard, rooted_redirect};
use super::session::{ProviderSessionStore, Session};
use super::token;
use crate::backend::{BackendError, RegisterPayload, Upload};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex compiles"));

pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// Raw `?redirect=` value carried through the login page.
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub file: Option<Upload>,
    pub redirect: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub redirect: String,
    pub role: Option<Role>,
    pub session: Session,
    /// Credential cookies plus the unified session cookie.
    pub set_cookies: HeaderMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    Validation(FieldErrors),
    Failed(AppError),
}

impl From<AppError> for ActionError {
    fn from(e: AppError) -> Self { ActionError::Failed(e) }
}

/// Wire shape handed back to the form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl ActionResponse {
    pub fn from_result(res: &Result<LoginSuccess, ActionError>) -> (u16, Self) {
        match res {
            Ok(ok) => (200, Self { success: true, redirect: Some(ok.redirect.clone()), role: ok.role.clone(), errors: None, error: None }),
            Err(ActionError::Validation(errs)) => (400, Self { success: false, redirect: None, role: None, errors: Some(errs.clone()), error: None }),
            Err(ActionError::Failed(e)) => (e.http_status(), Self { success: false, redirect: None, role: None, errors: None, error: Some(e.clone()) }),
        }
    }
}

fn check_email(email: &str, errors: &mut FieldErrors) {
    if email.trim().is_empty() {
        errors.insert("email", "email is required".into());
    } else if !EMAIL_RE.is_match(email.trim()) {
        errors.insert("email", "enter a valid email address".into());
    }
}

fn check_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert("password", format!("password must be at least {} characters", MIN_PASSWORD_LEN));
    }
}

pub fn validate_login(form: &LoginForm) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

pub fn validate_register(form: &RegisterForm) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if form.name.trim().is_empty() {
        errors.insert("name", "name is required".into());
    }
    check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[derive(Clone)]
pub struct AuthActions {
    refresher: SessionRefresher,
    credentials: CredentialSessionStore,
    sessions: ProviderSessionStore,
    jwt_secret: String,
}

impl AuthActions {
    pub fn new(refresher: SessionRefresher, credentials: CredentialSessionStore, sessions: ProviderSessionStore, jwt_secret: impl Into<String>) -> Self {
        Self { refresher, credentials, sessions, jwt_secret: jwt_secret.into() }
    }

    pub async fn login(&self, form: &LoginForm) -> Result<LoginSuccess, ActionError> {
        validate_login(form).map_err(ActionError::Validation)?;
        let email = form.email.trim();
        let pair = match self.refresher.backend().login(email, &form.password).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "auth", email = %email, "login failed: {}", e);
                return Err(AppError::from(e).into());
            }
        };

        let mut set_cookies = HeaderMap::new();
        self.credentials.write(&mut set_cookies, &pair.access_token, &pair.refresh_token);
        let session = self.refresher.session_from_login(&pair, Some(email), Utc::now());
        self.sessions.write(&mut set_cookies, &session);

        // Role from the fresh token picks the landing page without another round trip.
        let role = token::verify(&pair.access_token, &self.jwt_secret)
            .map(|c| c.role)
            .ok()
            .or_else(|| pair.user.role.clone());
        let redirect = match form.redirect.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => rooted_redirect(r),
            None => default_dashboard(role.as_ref()).to_string(),
        };
        info!(target: "auth", user = %session.subject_id, role = ?role, redirect = %redirect, "login succeeded");
        Ok(LoginSuccess { redirect, role, session, set_cookies })
    }

    /// Register, then sign straight in with the same form data.
    pub async fn register(&self, form: RegisterForm) -> Result<LoginSuccess, ActionError> {
        validate_register(&form).map_err(ActionError::Validation)?;
        let payload = RegisterPayload {
            name: form.name.trim().to_string(),
            email: form.email.trim().to_string(),
            password: form.password.clone(),
            file: form.file,
        };
        match self.refresher.backend().register(&payload).await {
            Ok(user) => info!(target: "auth", user = %user.id, "registered"),
            Err(BackendError::Rejected { status, message }) if (400..500).contains(&status) => {
                warn!(target: "auth", email = %payload.email, status, "registration rejected: {}", message);
                return Err(AppError::validation("registration_rejected".to_string(), message).into());
            }
            Err(e) => {
                warn!(target: "auth", email = %payload.email, "registration failed: {}", e);
                return Err(AppError::from(e).into());
            }
        }
        self.login(&LoginForm { email: payload.email, password: payload.password, redirect: form.redirect }).await
    }

    pub fn credentials(&self) -> &CredentialSessionStore { &self.credentials }
    pub fn sessions(&self) -> &ProviderSessionStore { &self.sessions }
    pub fn refresher(&self) -> &SessionRefresher { &self.refresher }
}
