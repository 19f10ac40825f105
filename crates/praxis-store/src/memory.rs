//! In-memory reference backends.
//!
//! `MemoryStore` and `MemoryVolatile` implement the collaborator traits
//! entirely in process. They back the development-mode binary and the test
//! suites; production wires real SQL and Redis implementations instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use praxis_core::{AgentId, ByteAttemptId, UserId, WorkspaceId};

use crate::error::{Result, StoreError};
use crate::models::{
    AgentCredentials, AgentRecord, CodeFile, Difficulty, User, UserSession, WorkspaceRecord,
};
use crate::store::{SessionStore, StoreHealth, UserStore, WorkspaceStore};
use crate::volatile::VolatileStore;

/// In-memory implementation of the relational-store traits.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    sessions: RwLock<HashMap<UserId, UserSession>>,
    workspaces: RwLock<HashMap<WorkspaceId, (WorkspaceRecord, Vec<AgentRecord>)>>,
    code: RwLock<HashMap<(ByteAttemptId, &'static str), Vec<CodeFile>>>,
    teardowns: Mutex<Vec<(WorkspaceId, UserId)>>,
    healthy: AtomicBool,
}

impl MemoryStore {
    /// Create an empty, healthy store.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        store.healthy.store(true, Ordering::Relaxed);
        store
    }

    /// Insert or replace a user.
    pub fn insert_user(&self, user: User) {
        self.users.write().insert(user.id, user);
    }

    /// Insert or replace the session for a user.
    pub fn insert_session(&self, session: UserSession) {
        self.sessions.write().insert(session.user_id, session);
    }

    /// Remove the session for a user.
    pub fn remove_session(&self, user: UserId) {
        self.sessions.write().remove(&user);
    }

    /// Insert or replace a workspace together with its agents.
    pub fn insert_workspace(&self, record: WorkspaceRecord, agents: Vec<AgentRecord>) {
        self.workspaces.write().insert(record.id, (record, agents));
    }

    /// Fetch a workspace record, if present.
    #[must_use]
    pub fn workspace(&self, id: WorkspaceId) -> Option<WorkspaceRecord> {
        self.workspaces.read().get(&id).map(|(record, _)| record.clone())
    }

    /// Files last written for a byte attempt at a difficulty.
    #[must_use]
    pub fn code_files(&self, byte_attempt: ByteAttemptId, difficulty: Difficulty) -> Option<Vec<CodeFile>> {
        self.code
            .read()
            .get(&(byte_attempt, difficulty.column_suffix()))
            .cloned()
    }

    /// Teardown requests recorded so far.
    #[must_use]
    pub fn teardown_requests(&self) -> Vec<(WorkspaceId, UserId)> {
        self.teardowns.lock().clone()
    }

    /// Flip the health flag consulted by `ping`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session_for_user(&self, id: UserId) -> Result<Option<UserSession>> {
        Ok(self.sessions.read().get(&id).cloned())
    }
}

#[async_trait]
impl WorkspaceStore for MemoryStore {
    async fn agent_for_byte_attempt(
        &self,
        byte_attempt: ByteAttemptId,
        owner: UserId,
    ) -> Result<Option<AgentCredentials>> {
        let workspaces = self.workspaces.read();
        let newest = workspaces
            .values()
            .filter(|(record, _)| record.byte_attempt_id == byte_attempt && record.owner_id == owner)
            .max_by_key(|(record, _)| record.id);

        let Some((record, agents)) = newest else {
            return Ok(None);
        };
        let Some(agent) = agents.iter().max_by_key(|agent| agent.created_at) else {
            return Ok(None);
        };

        Ok(Some(AgentCredentials {
            agent_id: agent.id,
            secret: agent.secret.clone(),
            workspace_id: record.id,
            workspace_state: record.state,
        }))
    }

    async fn newest_agent(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Option<(AgentId, String, UserId)>> {
        let workspaces = self.workspaces.read();
        let Some((record, agents)) = workspaces.get(&workspace) else {
            return Ok(None);
        };
        Ok(agents
            .iter()
            .max_by_key(|agent| agent.created_at)
            .map(|agent| (agent.id, agent.secret.clone(), record.owner_id)))
    }

    async fn extend_workspace_expiration(
        &self,
        byte_attempt: ByteAttemptId,
        owner: UserId,
        until: DateTime<Utc>,
    ) -> Result<()> {
        let mut workspaces = self.workspaces.write();
        for (record, _) in workspaces.values_mut() {
            if record.byte_attempt_id == byte_attempt
                && record.owner_id == owner
                && record.state.is_live()
            {
                record.expiration = until;
            }
        }
        Ok(())
    }

    async fn update_byte_attempt_code(
        &self,
        byte_attempt: ByteAttemptId,
        _owner: UserId,
        difficulty: Difficulty,
        files: Vec<CodeFile>,
    ) -> Result<()> {
        self.code
            .write()
            .insert((byte_attempt, difficulty.column_suffix()), files);
        Ok(())
    }

    async fn request_teardown(&self, workspace: WorkspaceId, owner: UserId) -> Result<()> {
        self.teardowns.lock().push((workspace, owner));
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("ping failed".to_string()))
        }
    }
}

struct VolatileEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory implementation of [`VolatileStore`].
///
/// Expired entries are reaped lazily on access.
#[derive(Default)]
pub struct MemoryVolatile {
    entries: Mutex<HashMap<String, VolatileEntry>>,
    fail: AtomicBool,
}

impl MemoryVolatile {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, to exercise degraded paths.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    /// Remaining TTL of a live key.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    /// Whether a live (unexpired) entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.ttl_of(key).is_some()
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("volatile store down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VolatileStore for MemoryVolatile {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_failing()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.check_failing()?;
        self.entries.lock().insert(
            key.to_string(),
            VolatileEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_failing()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        self.check_failing()?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_failing()?;
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        self.check_failing()?;
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                let current: u64 = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| StoreError::Corrupt(format!("counter {key}")))?;
                let next = current + 1;
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    VolatileEntry {
                        value: b"1".to_vec(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }
}
