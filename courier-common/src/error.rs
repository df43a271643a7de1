// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The error taxonomy of §7. Every crate-local error enum converts into
//! [`ErrorKind`] at its API boundary so the HTTP status mapping lives in one
//! place (the `ApiError` wrapper of `courier-authority-server` and
//! `courier-ingress`).

use thiserror::Error;

/// Canonical error kind, independent of HTTP status codes.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("validation error on field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("transient dependency error: {0}")]
    TransientDependency(String),

    #[error("permanent dependency error: {0}")]
    PermanentDependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller (namely the worker, per §7 policy) may treat this as
    /// retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::TransientDependency(_))
    }
}

impl From<crate::crypto::ear::DecryptionError> for ErrorKind {
    fn from(err: crate::crypto::ear::DecryptionError) -> Self {
        ErrorKind::Internal(err.to_string())
    }
}

impl From<crate::crypto::password::PasswordError> for ErrorKind {
    fn from(err: crate::crypto::password::PasswordError) -> Self {
        ErrorKind::Internal(err.to_string())
    }
}

impl From<crate::crypto::jwt::TokenError> for ErrorKind {
    fn from(err: crate::crypto::jwt::TokenError) -> Self {
        ErrorKind::Authentication(err.to_string())
    }
}

impl From<sqlx::Error> for ErrorKind {
    fn from(err: sqlx::Error) -> Self {
        ErrorKind::TransientDependency(err.to_string())
    }
}
