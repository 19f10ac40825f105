//! Storage collaborator interfaces for the praxis gateway.
//!
//! The gateway never talks to its databases directly. The relational store
//! and the volatile (TTL) store are external collaborators, so this crate
//! defines the traits the gateway consumes plus in-memory reference backends
//! used by the binary in development mode and by the test suites:
//!
//! - [`UserStore`] / [`SessionStore`] / [`WorkspaceStore`] — the relational
//!   store surface, combined as [`PlatformStore`]
//! - [`VolatileStore`] — the shared TTL'd blob store (Redis-shaped) backing
//!   the response cache and the rate limiter
//! - [`MemoryStore`] / [`MemoryVolatile`] — reference implementations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod models;
pub mod store;
pub mod volatile;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, MemoryVolatile};
pub use models::{
    AgentCredentials, AgentRecord, CodeFile, Difficulty, User, UserSession, WorkspaceRecord,
    WorkspaceState,
};
pub use store::{PlatformStore, SessionStore, StoreHealth, UserStore, WorkspaceStore};
pub use volatile::VolatileStore;
