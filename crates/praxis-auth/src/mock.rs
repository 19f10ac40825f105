//! A mock validator for tests and dev mode.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{AuthError, Result};
use crate::token::{TokenValidator, ValidatedToken};

/// Resolves pre-registered tokens without any cryptography.
#[derive(Default)]
pub struct MockValidator {
    tokens: RwLock<HashMap<String, ValidatedToken>>,
    failing: RwLock<bool>,
}

impl MockValidator {
    /// Create an empty mock validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token so that validating it yields `validated`.
    pub fn register(&self, token: impl Into<String>, validated: ValidatedToken) {
        self.tokens.write().insert(token.into(), validated);
    }

    /// Make every validation fail with an internal error.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write() = failing;
    }
}

#[async_trait]
impl TokenValidator for MockValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedToken> {
        if *self.failing.read() {
            return Err(AuthError::Internal("mock validator down".to_string()));
        }
        self.tokens
            .read()
            .get(token)
            .copied()
            .ok_or(AuthError::InvalidToken)
    }
}
