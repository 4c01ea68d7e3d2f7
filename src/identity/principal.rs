use serde::{Deserialize, Serialize};

/// Role claim carried by access tokens and the unified session.
///
/// The backend emits upper-case role names (`ADMIN`, `USER`); anything else is kept
/// verbatim so it can be logged, and is routed like an unknown role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
            Role::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else if s.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Other(s)
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self { Role::from(s.to_string()) }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        match r {
            Role::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Per-request identity outcome. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthDecision {
    pub authenticated: bool,
    pub role: Option<Role>,
}

impl AuthDecision {
    pub fn anonymous() -> Self { Self::default() }
    pub fn with_role(role: Role) -> Self { Self { authenticated: true, role: Some(role) } }
}
