//! Identity, sessions and route authorization for the web front end.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod cookies;
mod session;
mod refresher;
mod resolver;
mod actions;
pub mod token;
pub mod route_policy;
pub mod gate;

pub use principal::{AuthDecision, Role};
pub use cookies::{CredentialCookies, CredentialSessionStore, ACCESS_COOKIE, REFRESH_COOKIE, parse_cookie};
pub use session::{ProviderSessionStore, Session, SessionError, SessionUpdate, SESSION_COOKIE};
pub use refresher::{RefreshOutcome, Resolved, SessionRefresher, EXPIRY_SAFETY_MARGIN_SECS, PROFILE_SYNC_INTERVAL_SECS};
pub use resolver::{CookieTokenResolver, IdentityChain, IdentityResolver, ResolutionContext, UnifiedSessionResolver};
pub use actions::{ActionError, ActionResponse, AuthActions, FieldErrors, LoginForm, LoginSuccess, RegisterForm};
pub use route_policy::{OwnerKind, RoutePolicy};
pub use gate::{authorization_gate, AuthorizationGate, GateAction, GateOutcome};
