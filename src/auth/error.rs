//! Error taxonomy for the authentication core.

use std::collections::HashMap;
use thiserror::Error;

/// Reasons a presented session token is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token uses an unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// A unique constraint was hit (username, email, token hash, CSRF token)
    #[error("{0}")]
    Conflict(String),
    /// Unknown account or wrong password; deliberately indistinguishable
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthorized,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },
    /// Field-level validation failures, keyed by field name
    #[error("invalid input")]
    InvalidInput(HashMap<String, Vec<String>>),
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Store or runtime failure; details are logged, never returned
    #[error("internal error")]
    Internal,
}

impl AuthError {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AuthError::InvalidInput(errors)
    }
}

/// Convert a store failure at the core boundary.
///
/// Unique-constraint violations become `Conflict`; everything else is logged
/// with the operation name and collapsed to `Internal`.
pub(crate) fn store_error(operation: &'static str, err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            tracing::warn!(operation, "Unique constraint violated");
            let subject = if message.contains("users.username") {
                "Username already exists"
            } else if message.contains("users.email") {
                "Email is already registered"
            } else {
                "Record already exists"
            };
            return AuthError::Conflict(subject.to_string());
        }
    }

    tracing::error!(operation, error = %err, "Store operation failed");
    AuthError::Internal
}
