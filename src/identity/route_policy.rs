//! Route ownership policy: which role (if any) may navigate to a path.
//!
//! The policy is data. Entries are evaluated in table order (Admin, User, Common);
//! inside an entry exact paths are tried before regex patterns. Kinds must not
//! overlap, see [`RoutePolicy::check_disjoint`]. Unmatched paths are public: every
//! new protected page has to be registered here.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::principal::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    /// Public page.
    None,
    /// Any authenticated user.
    Common,
    Admin,
    User,
}

impl OwnerKind {
    /// Role required to view a page of this kind, if the kind is role-bound.
    pub fn required_role(self) -> Option<Role> {
        match self {
            OwnerKind::Admin => Some(Role::Admin),
            OwnerKind::User => Some(Role::User),
            OwnerKind::None | OwnerKind::Common => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub kind: OwnerKind,
    pub exact: Vec<String>,
    pub patterns: Vec<Regex>,
}

impl PolicyEntry {
    pub fn new(kind: OwnerKind, exact: &[&str], patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, exact: exact.iter().map(|s| s.to_string()).collect(), patterns })
    }

    fn matches_exact(&self, path: &str) -> bool { self.exact.iter().any(|e| e == path) }

    fn matches_pattern(&self, path: &str) -> bool { self.patterns.iter().any(|r| r.is_match(path)) }

    /// Exact paths and the literal prefix of each pattern.
    fn prefixes(&self) -> Vec<String> {
        let mut out = self.exact.clone();
        out.extend(self.patterns.iter().map(|re| literal_prefix(re.as_str())).filter(|p| !p.is_empty()));
        out
    }

    /// Literal path tails that close a pattern, such as `/edit` in `^/x/[^/]+/edit$`.
    fn suffixes(&self) -> Vec<String> {
        self.patterns.iter().filter_map(|re| literal_suffix(re.as_str())).collect()
    }
}

/// Sample paths for the overlap check: every prefix on its own, with a filler segment,
/// and joined with every tail any entry ends on.
fn sample_paths(entries: &[PolicyEntry]) -> Vec<String> {
    let suffixes: Vec<String> = entries.iter().flat_map(PolicyEntry::suffixes).collect();
    let mut out = Vec::new();
    for prefix in entries.iter().flat_map(PolicyEntry::prefixes) {
        let base = prefix.trim_end_matches('/');
        out.push(prefix.clone());
        out.push(format!("{}/sample", base));
        for tail in &suffixes {
            out.push(format!("{}{}", base, tail));
            out.push(format!("{}/sample{}", base, tail));
        }
    }
    out
}

/// Leading run of literal characters after an optional `^`.
fn literal_prefix(pattern: &str) -> String {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let mut out = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(n) if !n.is_ascii_alphanumeric() => out.push(n),
                _ => break,
            },
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '$' | '^' => break,
            other => out.push(other),
        }
    }
    out
}

/// Trailing literal run before `$`, starting at its first `/`.
fn literal_suffix(pattern: &str) -> Option<String> {
    let body = pattern.strip_suffix('$')?;
    let mut tail: Vec<char> = Vec::new();
    for c in body.chars().rev() {
        if matches!(c, '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '\\') {
            break;
        }
        tail.push(c);
    }
    let tail: String = tail.into_iter().rev().collect();
    let start = tail.find('/')?;
    Some(tail[start..].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path '{path}' is claimed by both {first:?} and {second:?}")]
pub struct PolicyOverlap {
    pub path: String,
    pub first: OwnerKind,
    pub second: OwnerKind,
}

/// Literal top-level pages used for signing in.
pub const AUTH_ROUTES: &[&str] = &["/login", "/register"];
pub const ADMIN_DASHBOARD: &str = "/adminDashboard/adminProfile";
pub const USER_DASHBOARD: &str = "/";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    entries: Vec<PolicyEntry>,
}

static DEFAULT_POLICY: Lazy<RoutePolicy> = Lazy::new(|| {
    let entries = vec![
        PolicyEntry::new(OwnerKind::Admin, &["/adminDashboard"], &[r"^/adminDashboard/.*"]),
        PolicyEntry::new(OwnerKind::User, &["/dashboard"], &[r"^/dashboard/.*"]),
        PolicyEntry::new(
            OwnerKind::Common,
            &["/my-profile", "/change-password"],
            &[r"^/messages(/.*)?$", r"^/travel-plans/create$", r"^/travel-plans/[^/]+/edit$"],
        ),
    ];
    RoutePolicy {
        entries: entries.into_iter().map(|e| e.expect("built-in route pattern compiles")).collect(),
    }
});

impl RoutePolicy {
    /// Build a custom policy. Rejects tables whose kinds overlap.
    pub fn new(entries: Vec<PolicyEntry>) -> Result<Self, PolicyOverlap> {
        let policy = Self { entries };
        policy.check_disjoint()?;
        Ok(policy)
    }

    /// The platform's built-in route table.
    pub fn builtin() -> &'static RoutePolicy { &DEFAULT_POLICY }

    pub fn entries(&self) -> &[PolicyEntry] { &self.entries }

    /// Owner of `path`. One trailing `/` is ignored, so `/my-profile/` is `/my-profile`.
    pub fn classify(&self, path: &str) -> OwnerKind {
        let path = canonical_path(path);
        if let Some(e) = self.entries.iter().find(|e| e.matches_exact(path)) {
            return e.kind;
        }
        if let Some(e) = self.entries.iter().find(|e| e.matches_pattern(path)) {
            return e.kind;
        }
        OwnerKind::None
    }

    /// No sample path may be claimed by entries of two different kinds.
    pub fn check_disjoint(&self) -> Result<(), PolicyOverlap> {
        for path in sample_paths(&self.entries) {
            let mut owners = self.entries.iter().filter(|e| e.matches_exact(&path) || e.matches_pattern(&path));
            let Some(first) = owners.next() else { continue };
            if let Some(other) = owners.find(|e| e.kind != first.kind) {
                return Err(PolicyOverlap { path, first: first.kind, second: other.kind });
            }
        }
        Ok(())
    }
}

fn canonical_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(p) if !p.is_empty() => p,
        _ => path,
    }
}

pub fn is_auth_route(path: &str) -> bool { AUTH_ROUTES.contains(&canonical_path(path)) }

/// Landing route for a role; unknown or absent roles go to the site root.
pub fn default_dashboard(role: Option<&Role>) -> &'static str {
    match role {
        Some(Role::Admin) => ADMIN_DASHBOARD,
        _ => USER_DASHBOARD,
    }
}

/// Force a `?redirect=` value to be a rooted path on this site.
pub fn rooted_redirect(target: &str) -> String {
    // Browsers drop tabs and newlines inside URLs, so `/\t/host` would read as `//host`.
    let cleaned: String = target.chars().filter(|c| !c.is_control()).collect();
    let stripped = cleaned.trim().trim_start_matches(['/', '\\']);
    format!("/{}", stripped)
}

/// `/login?redirect=<path>` with the path query-encoded.
pub fn login_redirect_for(path: &str) -> String {
    format!("{}?redirect={}", LOGIN_PATH, urlencoding::encode(path).replace("%2F", "/"))
}
