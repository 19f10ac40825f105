//! Core identifier types for the praxis platform.
//!
//! All persisted entities are keyed by 64-bit snowflake IDs. On the wire the
//! IDs travel as decimal strings (JavaScript clients cannot represent the
//! full 64-bit range as numbers), so every ID serializes to and from a
//! string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The string was not a decimal 64-bit integer.
    #[error("invalid id: {0:?}")]
    InvalidFormat(String),
}

macro_rules! snowflake_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(i64);

        impl $name {
            /// Create an ID from its raw snowflake value.
            #[must_use]
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// Return the raw snowflake value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>()
                    .map(Self)
                    .map_err(|_| IdError::InvalidFormat(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

snowflake_id! {
    /// A user identifier.
    UserId
}

snowflake_id! {
    /// A workspace identifier.
    ///
    /// A workspace is the long-lived sandbox that hosts exactly one agent,
    /// reachable only through the overlay mesh.
    WorkspaceId
}

snowflake_id! {
    /// A workspace agent identifier.
    AgentId
}

snowflake_id! {
    /// A byte attempt identifier.
    ///
    /// A byte attempt is a per-user sandboxed coding exercise record; it owns
    /// exactly one workspace at a time.
    ByteAttemptId
}

snowflake_id! {
    /// A per-request identifier, generated by the request initializer.
    RequestId
}
