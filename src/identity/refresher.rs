//! Keeps the unified session usable: creates it at sign-in, merges client edits,
//! refreshes an expired access token and periodically resyncs profile fields.
//!
//! One resolution pass does at most one of refresh or resync. A refresh is always
//! followed by an immediate profile merge, so it also counts as the sync for that
//! window. Nothing here fails the caller: backend trouble becomes
//! `SessionError::RefreshFailed` or a logged, skipped resync.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::session::{Session, SessionError, SessionUpdate};
use super::token::{self, ACCESS_TOKEN_TTL_SECS};
use crate::backend::{BackendClient, BackendError, BackendUser, TokenPair};

/// Minimum time between two profile resyncs of one session.
pub const PROFILE_SYNC_INTERVAL_SECS: i64 = 5 * 60;
/// Access tokens are treated as expired this long before their real expiry.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// What a resolution pass did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Unchanged,
    Resynced,
    Refreshed,
    RefreshFailed,
}

impl RefreshOutcome {
    /// Whether the session cookie has to be re-issued.
    pub fn changed(self) -> bool { !matches!(self, RefreshOutcome::Unchanged) }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub session: Session,
    pub outcome: RefreshOutcome,
}

#[derive(Clone)]
pub struct SessionRefresher {
    backend: BackendClient,
    jwt_secret: String,
}

impl SessionRefresher {
    pub fn new(backend: BackendClient, jwt_secret: impl Into<String>) -> Self {
        Self { backend, jwt_secret: jwt_secret.into() }
    }

    pub fn backend(&self) -> &BackendClient { &self.backend }

    /// `issuedAt + 1h - 60s`, taking `issuedAt` from the token when it verifies and
    /// from `now` otherwise.
    pub fn expiry_for(&self, access_token: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let issued = token::verify(access_token, &self.jwt_secret)
            .ok()
            .and_then(|c| c.issued_at)
            .and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0))
            .unwrap_or(now);
        issued + Duration::seconds(ACCESS_TOKEN_TTL_SECS - EXPIRY_SAFETY_MARGIN_SECS)
    }

    /// Initial sign-in with credentials: the login response already has everything.
    pub fn session_from_login(&self, pair: &TokenPair, email: Option<&str>, now: DateTime<Utc>) -> Session {
        let claims = token::verify(&pair.access_token, &self.jwt_secret).ok();
        let user = &pair.user;
        let subject_id = if user.id.is_empty() {
            claims.as_ref().map(|c| c.subject_id.clone()).unwrap_or_default()
        } else {
            user.id.clone()
        };
        let role = user.role.clone().or_else(|| claims.as_ref().map(|c| c.role.clone()));
        Session {
            subject_id,
            email: user.email.clone().or_else(|| email.map(str::to_string)),
            role,
            premium: user.premium.unwrap_or(false),
            subscription_type: user.subscription_type.clone(),
            display_name: user.name.clone(),
            avatar_url: user.profile_image.clone(),
            access_token: pair.access_token.clone(),
            refresh_token: Some(pair.refresh_token.clone()),
            access_token_expires_at: self.expiry_for(&pair.access_token, now),
            last_profile_sync_at: now,
            error: None,
        }
    }

    /// Initial sign-in through the OAuth provider. The provider identity cannot
    /// authorize role-bound routes, so the backend is asked for our own token pair.
    pub async fn sign_in_oauth(
        &self,
        email: &str,
        name: Option<&str>,
        image: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session, BackendError> {
        let pair = self.backend.login_google(email, name, image).await?;
        let mut session = self.session_from_login(&pair, Some(email), now);
        // Keep the provider's cosmetic fields when the backend has none yet.
        if session.display_name.is_none() {
            session.display_name = name.map(str::to_string);
        }
        if session.avatar_url.is_none() {
            session.avatar_url = image.map(str::to_string);
        }
        info!(target: "session", user = %session.subject_id, "oauth sign-in synced with backend");
        Ok(session)
    }

    /// Merge a client-side profile edit. No backend call.
    pub fn apply_update(session: &mut Session, update: &SessionUpdate) -> bool {
        if update.is_empty() {
            return false;
        }
        if let Some(n) = &update.display_name {
            session.display_name = Some(n.clone());
        }
        if let Some(a) = &update.avatar_url {
            session.avatar_url = Some(a.clone());
        }
        if let Some(p) = update.premium {
            session.premium = p;
        }
        if let Some(s) = &update.subscription_type {
            session.subscription_type = Some(s.clone());
        }
        true
    }

    fn is_stale(session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_profile_sync_at >= Duration::seconds(PROFILE_SYNC_INTERVAL_SECS)
    }

    /// One resolution pass over a session read from the cookie.
    pub async fn resolve(&self, mut session: Session, now: DateTime<Utc>) -> Resolved {
        if session.is_expired(now) {
            let outcome = if self.refresh(&mut session, now).await {
                RefreshOutcome::Refreshed
            } else {
                RefreshOutcome::RefreshFailed
            };
            return Resolved { session, outcome };
        }
        if Self::is_stale(&session, now) && self.resync(&mut session, now).await {
            return Resolved { session, outcome: RefreshOutcome::Resynced };
        }
        Resolved { session, outcome: RefreshOutcome::Unchanged }
    }

    async fn refresh(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        let Some(rt) = session.refresh_token.clone() else {
            warn!(target: "session", user = %session.subject_id, "access token expired and no refresh token held");
            session.error = Some(SessionError::RefreshFailed);
            return false;
        };
        match self.backend.refresh(&rt).await {
            Ok(tokens) => {
                session.access_token_expires_at = self.expiry_for(&tokens.access_token, now);
                session.access_token = tokens.access_token;
                if let Some(new_rt) = tokens.refresh_token.filter(|t| !t.is_empty()) {
                    session.refresh_token = Some(new_rt);
                }
                session.error = None;
                info!(target: "session", user = %session.subject_id, expires_at = %session.access_token_expires_at, "access token refreshed");
                // The refresh doubles as this window's profile sync.
                let _ = self.resync(session, now).await;
                true
            }
            Err(e) => {
                warn!(target: "session", user = %session.subject_id, "token refresh failed: {}", e);
                session.error = Some(SessionError::RefreshFailed);
                false
            }
        }
    }

    async fn resync(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        if session.subject_id.is_empty() {
            return false;
        }
        match self.backend.fetch_profile(&session.subject_id, &session.access_token).await {
            Ok(profile) => {
                merge_profile(session, &profile);
                session.last_profile_sync_at = now;
                debug!(target: "session", user = %session.subject_id, "profile resynced");
                true
            }
            Err(e) => {
                warn!(target: "session", user = %session.subject_id, "profile resync failed: {}", e);
                false
            }
        }
    }
}

/// Cosmetic fields only; role and tokens are never taken from a profile read.
fn merge_profile(session: &mut Session, profile: &BackendUser) {
    if let Some(img) = &profile.profile_image {
        session.avatar_url = Some(img.clone());
    }
    if let Some(name) = &profile.name {
        session.display_name = Some(name.clone());
    }
    if let Some(p) = profile.premium {
        session.premium = p;
    }
    if profile.subscription_type.is_some() {
        session.subscription_type = profile.subscription_type.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    fn refresher() -> SessionRefresher {
        let backend = BackendClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(200)).unwrap();
        SessionRefresher::new(backend, "k")
    }

    fn session(now: DateTime<Utc>) -> Session {
        Session {
            subject_id: "u1".into(),
            email: None,
            role: Some(Role::User),
            premium: false,
            subscription_type: None,
            display_name: Some("Old".into()),
            avatar_url: None,
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            access_token_expires_at: now + Duration::minutes(30),
            last_profile_sync_at: now,
            error: None,
        }
    }

    #[test]
    fn expiry_uses_token_iat_minus_margin() {
        let r = refresher();
        let t = token::issue("u1", &Role::User, None, ACCESS_TOKEN_TTL_SECS, "k").unwrap();
        let iat = token::verify(&t, "k").unwrap().issued_at.unwrap();
        let exp = r.expiry_for(&t, Utc::now());
        assert_eq!(exp.timestamp(), iat + ACCESS_TOKEN_TTL_SECS - EXPIRY_SAFETY_MARGIN_SECS);
    }

    #[test]
    fn expiry_falls_back_to_now_for_unverifiable_tokens() {
        let now = Utc::now();
        let exp = refresher().expiry_for("opaque", now);
        assert_eq!(exp, now + Duration::seconds(3540));
    }

    #[test]
    fn apply_update_merges_only_given_fields() {
        let now = Utc::now();
        let mut s = session(now);
        let changed = SessionRefresher::apply_update(&mut s, &SessionUpdate { avatar_url: Some("http://a".into()), ..Default::default() });
        assert!(changed);
        assert_eq!(s.avatar_url.as_deref(), Some("http://a"));
        assert_eq!(s.display_name.as_deref(), Some("Old"));
        assert_eq!(s.last_profile_sync_at, now);
        assert!(!SessionRefresher::apply_update(&mut s, &SessionUpdate::default()));
    }

    #[tokio::test]
    async fn fresh_session_is_left_alone() {
        let now = Utc::now();
        let out = refresher().resolve(session(now), now).await;
        assert_eq!(out.outcome, RefreshOutcome::Unchanged);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_flagged() {
        let now = Utc::now();
        let mut s = session(now);
        s.refresh_token = None;
        s.access_token_expires_at = now - Duration::seconds(1);
        let out = refresher().resolve(s, now).await;
        assert_eq!(out.outcome, RefreshOutcome::RefreshFailed);
        assert_eq!(out.session.error, Some(SessionError::RefreshFailed));
        assert_eq!(out.session.role, Some(Role::User));
    }

    #[test]
    fn merge_profile_never_touches_role_or_tokens() {
        let now = Utc::now();
        let mut s = session(now);
        merge_profile(&mut s, &BackendUser {
            id: "u1".into(),
            role: Some(Role::Admin),
            premium: Some(true),
            subscription_type: Some("YEARLY".into()),
            profile_image: Some("http://new".into()),
            name: Some("New".into()),
            email: None,
        });
        assert_eq!(s.role, Some(Role::User));
        assert_eq!(s.access_token, "at");
        assert!(s.premium);
        assert_eq!(s.display_name.as_deref(), Some("New"));
    }

    #[test]
    fn profile_without_premium_keeps_the_flag() {
        let now = Utc::now();
        let mut s = session(now);
        s.premium = true;
        merge_profile(&mut s, &BackendUser { id: "u1".into(), name: Some("Renamed".into()), ..Default::default() });
        assert!(s.premium);
        assert_eq!(s.display_name.as_deref(), Some("Renamed"));

        merge_profile(&mut s, &BackendUser { id: "u1".into(), premium: Some(false), ..Default::default() });
        assert!(!s.premium);
    }
}
