//! Authentication error types.

use thiserror::Error;

use voice_confirm_core::EmailError;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Wrong password or unknown email.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but is disabled.
    #[error("inactive user")]
    InactiveUser,

    /// Bearer token missing, malformed, expired or for a deleted user.
    #[error("invalid token")]
    InvalidToken,

    #[error("email already registered")]
    EmailTaken,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("token encoding error: {0}")]
    TokenEncoding(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
