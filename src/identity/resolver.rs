//! Identity strategies tried in fixed priority. The first resolver that yields a
//! role supplies the request's `AuthDecision`; later ones are not consulted.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::debug;

use super::cookies::CredentialSessionStore;
use super::principal::{AuthDecision, Role};
use super::refresher::SessionRefresher;
use super::session::ProviderSessionStore;
use super::token;
use crate::config::RefreshFailurePolicy;

/// Side effects a resolver wants applied to the response, whatever the decision is.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    /// An access-token cookie was present but did not verify.
    pub poisoned_credentials: bool,
    /// `Set-Cookie` headers to attach (e.g. a re-issued unified session).
    pub set_cookies: HeaderMap,
    /// Name of the resolver that authenticated the request.
    pub source: Option<&'static str>,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// A role when this strategy authenticates the request, `None` to fall through.
    async fn resolve(&self, headers: &HeaderMap, ctx: &mut ResolutionContext) -> Option<Role>;
}

/// Strategy A: the `accessToken` cookie set by the credentials login.
pub struct CookieTokenResolver {
    store: CredentialSessionStore,
    jwt_secret: String,
}

impl CookieTokenResolver {
    pub fn new(store: CredentialSessionStore, jwt_secret: impl Into<String>) -> Self {
        Self { store, jwt_secret: jwt_secret.into() }
    }
}

#[async_trait]
impl IdentityResolver for CookieTokenResolver {
    fn name(&self) -> &'static str { "credential_cookie" }

    async fn resolve(&self, headers: &HeaderMap, ctx: &mut ResolutionContext) -> Option<Role> {
        let access = self.store.read(headers).access_token?;
        match token::verify(&access, &self.jwt_secret) {
            Ok(claims) => Some(claims.role),
            Err(e) => {
                debug!(target: "gate", "access token cookie rejected: {}", e);
                ctx.poisoned_credentials = true;
                None
            }
        }
    }
}

/// Strategy B: the unified session cookie, refreshed on read.
pub struct UnifiedSessionResolver {
    store: ProviderSessionStore,
    refresher: SessionRefresher,
    on_refresh_failure: RefreshFailurePolicy,
}

impl UnifiedSessionResolver {
    pub fn new(store: ProviderSessionStore, refresher: SessionRefresher, on_refresh_failure: RefreshFailurePolicy) -> Self {
        Self { store, refresher, on_refresh_failure }
    }
}

#[async_trait]
impl IdentityResolver for UnifiedSessionResolver {
    fn name(&self) -> &'static str { "unified_session" }

    async fn resolve(&self, headers: &HeaderMap, ctx: &mut ResolutionContext) -> Option<Role> {
        let session = self.store.read(headers)?;
        let resolved = self.refresher.resolve(session, Utc::now()).await;
        if resolved.outcome.changed() {
            self.store.write(&mut ctx.set_cookies, &resolved.session);
        }
        if resolved.session.error.is_some() && self.on_refresh_failure == RefreshFailurePolicy::ForceLogin {
            debug!(target: "gate", user = %resolved.session.subject_id, "refresh failed; policy forces login");
            return None;
        }
        resolved.session.role
    }
}

/// Ordered list of strategies.
#[derive(Clone, Default)]
pub struct IdentityChain {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl IdentityChain {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn names(&self) -> Vec<&'static str> { self.resolvers.iter().map(|r| r.name()).collect() }

    pub async fn resolve(&self, headers: &HeaderMap) -> (AuthDecision, ResolutionContext) {
        let mut ctx = ResolutionContext::default();
        for r in &self.resolvers {
            if let Some(role) = r.resolve(headers, &mut ctx).await {
                ctx.source = Some(r.name());
                return (AuthDecision::with_role(role), ctx);
            }
        }
        (AuthDecision::anonymous(), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    struct Fixed(&'static str, Option<Role>);

    #[async_trait]
    impl IdentityResolver for Fixed {
        fn name(&self) -> &'static str { self.0 }
        async fn resolve(&self, _: &HeaderMap, _: &mut ResolutionContext) -> Option<Role> { self.1.clone() }
    }

    #[tokio::test]
    async fn first_resolver_with_a_role_wins() {
        let chain = IdentityChain::new()
            .with(Fixed("a", None))
            .with(Fixed("b", Some(Role::Admin)))
            .with(Fixed("c", Some(Role::User)));
        let (d, ctx) = chain.resolve(&HeaderMap::new()).await;
        assert_eq!(d, AuthDecision::with_role(Role::Admin));
        assert_eq!(ctx.source, Some("b"));
    }

    #[tokio::test]
    async fn empty_chain_is_anonymous() {
        let (d, ctx) = IdentityChain::new().resolve(&HeaderMap::new()).await;
        assert!(!d.authenticated);
        assert!(ctx.source.is_none());
    }

    #[tokio::test]
    async fn bad_cookie_marks_poisoned() {
        let r = CookieTokenResolver::new(CredentialSessionStore::new(false), "k");
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("accessToken=garbage; refreshToken=x"));
        let mut ctx = ResolutionContext::default();
        assert!(r.resolve(&h, &mut ctx).await.is_none());
        assert!(ctx.poisoned_credentials);
    }

    #[tokio::test]
    async fn valid_cookie_yields_role() {
        let t = token::issue("u", &Role::User, None, 60, "k").unwrap();
        let r = CookieTokenResolver::new(CredentialSessionStore::new(false), "k");
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_str(&format!("accessToken={}", t)).unwrap());
        let mut ctx = ResolutionContext::default();
        assert_eq!(r.resolve(&h, &mut ctx).await, Some(Role::User));
        assert!(!ctx.poisoned_credentials);
    }
}
