//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors from token validation.
///
/// The gateway maps `InvalidToken` to a 403 logout directive and everything
/// else to a 500, so the distinction between "the token is bad" and "the
/// validator is broken" matters.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token failed signature or expiry checks.
    #[error("invalid token")]
    InvalidToken,

    /// The token validated but carried no usable subject.
    #[error("token missing subject")]
    MissingSubject,

    /// The validator itself failed.
    #[error("validator error: {0}")]
    Internal(String),
}
