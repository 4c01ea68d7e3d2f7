//! Unified application error model and mapping helpers.
//! Actions and HTTP handlers return `AppError` as structured data; the gate never
//! produces one (every gate branch has an explicit fallback).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::backend::BackendError;

/// Message shown for any credential rejection. Deliberately identical for unknown
/// account and wrong password.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "invalid email or password";
pub const NETWORK_FAILURE_MESSAGE: &str = "could not reach the server, check your connection";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Validation { code: String, message: String },
    Auth { code: String, message: String },
    Network { code: String, message: String },
    RefreshFailed { code: String, message: String },
    TokenInvalid { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Network { code, .. }
            | AppError::RefreshFailed { code, .. }
            | AppError::TokenInvalid { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Network { message, .. }
            | AppError::RefreshFailed { message, .. }
            | AppError::TokenInvalid { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AppError::Network { code: code.into(), message: msg.into() } }
    pub fn refresh_failed<S: Into<String>>(code: S, msg: S) -> Self { AppError::RefreshFailed { code: code.into(), message: msg.into() } }
    pub fn token_invalid<S: Into<String>>(code: S, msg: S) -> Self { AppError::TokenInvalid { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Generic credential failure; never says which half was wrong.
    pub fn invalid_credentials() -> Self { Self::auth("invalid_credentials", INVALID_CREDENTIALS_MESSAGE) }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::TokenInvalid { .. } => 401,
            AppError::RefreshFailed { .. } => 401,
            AppError::Network { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Whether the message may be shown to the end user as a top-level alert.
    pub fn user_visible(&self) -> bool {
        !matches!(self, AppError::TokenInvalid { .. } | AppError::Internal { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(_) | BackendError::Timeout => {
                AppError::network("network_failure", NETWORK_FAILURE_MESSAGE)
            }
            BackendError::Rejected { status, .. } if status == 400 || status == 401 || status == 403 || status == 404 => {
                AppError::invalid_credentials()
            }
            BackendError::Rejected { status, message } => {
                AppError::Internal { code: format!("backend_{}", status), message }
            }
            BackendError::Decode(msg) => AppError::Internal { code: "backend_decode".into(), message: msg },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
