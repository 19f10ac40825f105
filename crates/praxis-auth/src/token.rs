//! The token validation interface.

use async_trait::async_trait;

use praxis_core::UserId;

use crate::error::Result;

/// Claims attached to a validated session token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClaims {
    /// The second factor was completed for this session.
    pub otp_valid: bool,
    /// The session is a partial OAuth login awaiting confirmation.
    pub login_with_github: bool,
}

/// The outcome of validating a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedToken {
    /// The user the token belongs to.
    pub user_id: UserId,
    /// Session claims.
    pub claims: SessionClaims,
}

/// Trait for validating bearer session tokens.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a token and extract its subject and claims.
    ///
    /// # Errors
    ///
    /// [`crate::AuthError::InvalidToken`] for a bad signature or expired
    /// token; [`crate::AuthError::Internal`] when validation itself fails.
    async fn validate(&self, token: &str) -> Result<ValidatedToken>;
}
