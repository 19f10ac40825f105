//! Core types and utilities for the praxis platform.
//!
//! This crate provides the foundational types used throughout the praxis
//! gateway and its collaborators:
//!
//! - **Identifiers**: Strongly-typed snowflake IDs for users, workspaces,
//!   agents, byte attempts, and requests
//! - **Snowflake generator**: Monotonic-per-node ID generation
//!
//! # Example
//!
//! ```
//! use praxis_core::{SnowflakeGenerator, UserId};
//!
//! // Parse a user ID from its wire form
//! let user_id: UserId = "163045671337".parse().unwrap();
//!
//! // Generate request IDs on node 3
//! let generator = SnowflakeGenerator::new(3);
//! let request_id = generator.generate();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod snowflake;

pub use ids::{AgentId, ByteAttemptId, IdError, RequestId, UserId, WorkspaceId};
pub use snowflake::SnowflakeGenerator;
