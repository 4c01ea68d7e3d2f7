//! Per-request authorization gate, mounted as axum middleware in front of every page.
//!
//! Order of work: resolve identity through the [`IdentityChain`], classify the path
//! with the [`RoutePolicy`], then apply the decision table in [`decide`]. Every
//! branch ends in allow or redirect; nothing in here returns an error response.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::cookies::CredentialSessionStore;
use super::principal::AuthDecision;
use super::resolver::IdentityChain;
use super::route_policy::{default_dashboard, is_auth_route, login_redirect_for, OwnerKind, RoutePolicy};

/// Paths the gate never looks at: static assets, API routes, well-known files.
/// File-like names count only under the asset prefixes or at the site root.
static EXCLUDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^/(api|auth|_next/static|_next/image|static|assets|images)(/|$)|^/(favicon\.ico|robots\.txt|sitemap\.xml|health)$|^/\.well-known/|^/[^/]+\.[A-Za-z0-9]{1,8}$",
    )
    .expect("static path matcher compiles")
});

pub fn is_excluded(path: &str) -> bool { EXCLUDED.is_match(path) }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    Allow,
    Redirect {
        location: String,
        /// Drop both credential cookies along with the redirect.
        clear_credentials: bool,
    },
}

/// The decision table. First matching rule wins.
pub fn decide(auth: &AuthDecision, path: &str, poisoned_credentials: bool, policy: &RoutePolicy) -> GateAction {
    let kind = policy.classify(path);
    if auth.authenticated && is_auth_route(path) {
        return GateAction::Redirect { location: default_dashboard(auth.role.as_ref()).to_string(), clear_credentials: false };
    }
    if kind == OwnerKind::None {
        return GateAction::Allow;
    }
    if !auth.authenticated {
        return GateAction::Redirect { location: login_redirect_for(path), clear_credentials: poisoned_credentials };
    }
    if kind == OwnerKind::Common {
        return GateAction::Allow;
    }
    if let Some(required) = kind.required_role() {
        if auth.role.as_ref() != Some(&required) {
            return GateAction::Redirect { location: default_dashboard(auth.role.as_ref()).to_string(), clear_credentials: false };
        }
    }
    GateAction::Allow
}

/// Result of evaluating one request.
#[derive(Debug)]
pub struct GateOutcome {
    pub decision: AuthDecision,
    pub action: GateAction,
    /// `Set-Cookie` headers to attach to whatever response goes out.
    pub set_cookies: HeaderMap,
}

pub struct AuthorizationGate {
    chain: IdentityChain,
    policy: RoutePolicy,
    credentials: CredentialSessionStore,
}

impl AuthorizationGate {
    pub fn new(chain: IdentityChain, policy: RoutePolicy, credentials: CredentialSessionStore) -> Self {
        Self { chain, policy, credentials }
    }

    pub fn policy(&self) -> &RoutePolicy { &self.policy }

    /// Excluded paths pass straight through, unless the policy protects them.
    pub fn skips(&self, path: &str) -> bool {
        is_excluded(path) && self.policy.classify(path) == OwnerKind::None
    }

    pub async fn evaluate(&self, path: &str, headers: &HeaderMap) -> GateOutcome {
        let (decision, ctx) = self.chain.resolve(headers).await;
        let action = decide(&decision, path, ctx.poisoned_credentials, &self.policy);
        let mut set_cookies = ctx.set_cookies;
        if let GateAction::Redirect { clear_credentials: true, .. } = &action {
            self.credentials.clear(&mut set_cookies);
        }
        debug!(
            target: "gate",
            path = %path,
            authenticated = decision.authenticated,
            role = ?decision.role,
            source = ?ctx.source,
            action = ?action,
            "gate evaluated"
        );
        GateOutcome { decision, action, set_cookies }
    }
}

fn redirect_response(location: &str) -> Response {
    let mut resp = StatusCode::TEMPORARY_REDIRECT.into_response();
    if let Ok(v) = HeaderValue::from_str(location) {
        resp.headers_mut().insert(header::LOCATION, v);
    }
    resp
}

/// axum middleware: `middleware::from_fn_with_state(gate, authorization_gate)`.
pub async fn authorization_gate(State(gate): State<Arc<AuthorizationGate>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if gate.skips(&path) {
        return next.run(req).await;
    }
    let outcome = gate.evaluate(&path, req.headers()).await;
    let mut resp = match &outcome.action {
        GateAction::Allow => next.run(req).await,
        GateAction::Redirect { location, .. } => {
            info!(target: "gate", path = %path, location = %location, "redirecting");
            redirect_response(location)
        }
    };
    for v in outcome.set_cookies.get_all(header::SET_COOKIE).iter() {
        resp.headers_mut().append(header::SET_COOKIE, v.clone());
    }
    resp
}
