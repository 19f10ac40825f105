//! Relational store interfaces.
//!
//! These traits are the gateway's entire view of the relational database.
//! Production deployments implement them against the platform's SQL cluster;
//! the in-memory [`crate::MemoryStore`] implements them for development and
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use praxis_core::{AgentId, ByteAttemptId, UserId, WorkspaceId};

use crate::error::Result;
use crate::models::{AgentCredentials, CodeFile, Difficulty, User, UserSession};

/// Lookup of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by ID. `None` when no such user exists.
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>>;
}

/// Lookup of server-side session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for a user. `None` means the user is logged out.
    async fn session_for_user(&self, id: UserId) -> Result<Option<UserSession>>;
}

/// Workspace, agent, and byte-attempt operations used by the websocket fabric
/// and the agent authenticator.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Resolve the newest agent serving `byte_attempt`, scoped to `owner`.
    ///
    /// `None` when the byte attempt has no workspace owned by that user.
    async fn agent_for_byte_attempt(
        &self,
        byte_attempt: ByteAttemptId,
        owner: UserId,
    ) -> Result<Option<AgentCredentials>>;

    /// Resolve the newest agent of `workspace` for agent authentication.
    ///
    /// Returns `(agent_id, secret, owner_id)`; `None` when the workspace has
    /// no agent.
    async fn newest_agent(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Option<(AgentId, String, UserId)>>;

    /// Push the expiration of the live workspace serving `byte_attempt` out
    /// to `until`, scoped to `owner` and the starting/active states.
    async fn extend_workspace_expiration(
        &self,
        byte_attempt: ByteAttemptId,
        owner: UserId,
        until: DateTime<Utc>,
    ) -> Result<()>;

    /// Persist a code delta into the byte attempt's difficulty-suffixed
    /// files column and mark the attempt modified.
    async fn update_byte_attempt_code(
        &self,
        byte_attempt: ByteAttemptId,
        owner: UserId,
        difficulty: Difficulty,
        files: Vec<CodeFile>,
    ) -> Result<()>;

    /// Ask the fleet to tear down a workspace whose agent is unreachable.
    async fn request_teardown(&self, workspace: WorkspaceId, owner: UserId) -> Result<()>;
}

/// Liveness probe against the backing database.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Ping the database. An error means the store is unhealthy.
    async fn ping(&self) -> Result<()>;
}

/// The full relational-store surface consumed by the gateway.
pub trait PlatformStore: UserStore + SessionStore + WorkspaceStore + StoreHealth {}

impl<T> PlatformStore for T where T: UserStore + SessionStore + WorkspaceStore + StoreHealth {}
