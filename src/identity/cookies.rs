//! Cookie plumbing for the custom-credentials path: the `accessToken` / `refreshToken`
//! pair, plus the raw helpers shared with the unified session cookie.

use axum::http::{header, HeaderMap, HeaderValue};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

pub const ACCESS_COOKIE_MAX_AGE_SECS: i64 = 60 * 60;
pub const REFRESH_COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 90;

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// HttpOnly, SameSite=Lax, Path=/ cookie; `Secure` only in production.
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax{}", name, value, max_age_secs, secure))
        .unwrap_or_else(|_| clear_cookie(name))
}

pub fn clear_cookie(name: &str) -> HeaderValue {
    let v = format!("{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Lax", name);
    HeaderValue::from_str(&v).unwrap_or(HeaderValue::from_static("invalid=; Max-Age=0; Path=/"))
}

/// Both credential cookies as read from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialCookies {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CredentialSessionStore {
    pub secure: bool,
}

impl CredentialSessionStore {
    pub fn new(secure: bool) -> Self { Self { secure } }

    pub fn read(&self, headers: &HeaderMap) -> CredentialCookies {
        CredentialCookies {
            access_token: parse_cookie(headers, ACCESS_COOKIE),
            refresh_token: parse_cookie(headers, REFRESH_COOKIE),
        }
    }

    /// Append `Set-Cookie` headers for a freshly issued pair.
    pub fn write(&self, out: &mut HeaderMap, access_token: &str, refresh_token: &str) {
        out.append(header::SET_COOKIE, set_cookie(ACCESS_COOKIE, access_token, ACCESS_COOKIE_MAX_AGE_SECS, self.secure));
        out.append(header::SET_COOKIE, set_cookie(REFRESH_COOKIE, refresh_token, REFRESH_COOKIE_MAX_AGE_SECS, self.secure));
    }

    pub fn clear(&self, out: &mut HeaderMap) {
        out.append(header::SET_COOKIE, clear_cookie(ACCESS_COOKIE));
        out.append(header::SET_COOKIE, clear_cookie(REFRESH_COOKIE));
    }
}
