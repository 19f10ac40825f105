//! Session token validation and cookie handling for the praxis gateway.
//!
//! A session is an opaque bearer token carried in a cookie. This crate
//! defines the [`TokenValidator`] trait the gateway authenticates against,
//! an HS256 implementation backed by `jsonwebtoken`, and the cookie
//! construction/revocation helpers shared by the gateway and the login
//! endpoints.
//!
//! # Dev Mode
//!
//! Build with `--features test-utils` for [`MockValidator`], which resolves
//! pre-registered tokens without any cryptography.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cookie_jar;
pub mod error;
pub mod hs256;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod token;

pub use cookie_jar::{revocation_cookie, session_cookie, AUTH_COOKIE, EPHEMERAL_COOKIE};
pub use error::{AuthError, Result};
pub use hs256::Hs256Validator;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockValidator;
pub use token::{SessionClaims, TokenValidator, ValidatedToken};
