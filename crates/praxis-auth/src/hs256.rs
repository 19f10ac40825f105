//! HS256 session token validation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use praxis_core::UserId;

use crate::error::{AuthError, Result};
use crate::token::{SessionClaims, TokenValidator, ValidatedToken};

/// Wire form of the session token claims.
#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    /// Subject: the user ID as a decimal string.
    sub: String,
    /// Expiration timestamp (validated by jsonwebtoken).
    exp: u64,
    /// Second-factor completion for this session.
    #[serde(default, skip_serializing_if = "is_false")]
    otp_valid: bool,
    /// Partial OAuth login marker.
    #[serde(default, rename = "loginWithGithub", skip_serializing_if = "is_false")]
    login_with_github: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !value
}

/// Validates (and, for the login endpoints, issues) HS256 session tokens
/// using a shared process secret.
pub struct Hs256Validator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256Validator {
    /// Create a validator from the shared secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for `user_id` that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, user_id: UserId, claims: SessionClaims, ttl: Duration) -> Result<String> {
        let raw = RawClaims {
            sub: user_id.to_string(),
            exp: u64::try_from((Utc::now() + ttl).timestamp())
                .map_err(|_| AuthError::Internal("expiry before epoch".to_string()))?,
            otp_valid: claims.otp_valid,
            login_with_github: claims.login_with_github,
        };
        encode(&Header::new(Algorithm::HS256), &raw, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

#[async_trait]
impl TokenValidator for Hs256Validator {
    async fn validate(&self, token: &str) -> Result<ValidatedToken> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<RawClaims>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::ExpiredSignature
                | ErrorKind::InvalidToken
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::ImmatureSignature
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::InvalidToken,
                _ => AuthError::Internal(e.to_string()),
            }
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::MissingSubject)?;

        Ok(ValidatedToken {
            user_id,
            claims: SessionClaims {
                otp_valid: data.claims.otp_valid,
                login_with_github: data.claims.login_with_github,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Hs256Validator {
        Hs256Validator::new(b"praxis-test-secret")
    }

    #[tokio::test]
    async fn issue_and_validate() {
        let validator = validator();
        let token = validator
            .issue(
                UserId::from_raw(42),
                SessionClaims {
                    otp_valid: true,
                    login_with_github: false,
                },
                Duration::hours(1),
            )
            .unwrap();

        let validated = validator.validate(&token).await.unwrap();
        assert_eq!(validated.user_id, UserId::from_raw(42));
        assert!(validated.claims.otp_valid);
        assert!(!validated.claims.login_with_github);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let token = validator()
            .issue(UserId::from_raw(1), SessionClaims::default(), Duration::hours(1))
            .unwrap();
        let other = Hs256Validator::new(b"different-secret");
        assert!(matches!(
            other.validate(&token).await.unwrap_err(),
            AuthError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let validator = validator();
        let token = validator
            .issue(UserId::from_raw(1), SessionClaims::default(), Duration::hours(-2))
            .unwrap();
        assert!(matches!(
            validator.validate(&token).await.unwrap_err(),
            AuthError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert!(matches!(
            validator().validate("not-a-token").await.unwrap_err(),
            AuthError::InvalidToken
        ));
    }
}
