//! Shared fixtures for the gateway test suites.

// Not every suite touches every fixture.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use praxis_auth::{MockValidator, SessionClaims, ValidatedToken};
use praxis_core::{AgentId, ByteAttemptId, UserId, WorkspaceId};
use praxis_gateway::{GatewayConfig, GatewayState};
use praxis_mesh::LoopbackMesh;
use praxis_store::{
    AgentRecord, MemoryStore, MemoryVolatile, User, UserSession, WorkspaceRecord, WorkspaceState,
};

/// A gateway wired to in-memory backends the tests can reach into.
pub struct TestPlatform {
    pub store: Arc<MemoryStore>,
    pub volatile: Arc<MemoryVolatile>,
    pub validator: Arc<MockValidator>,
    pub mesh: Arc<LoopbackMesh>,
    pub state: Arc<GatewayState>,
}

pub fn platform(config: GatewayConfig) -> TestPlatform {
    let store = Arc::new(MemoryStore::new());
    let volatile = Arc::new(MemoryVolatile::new());
    let validator = Arc::new(MockValidator::new());
    let mesh = Arc::new(LoopbackMesh::new());
    let state = Arc::new(GatewayState::new(
        store.clone(),
        volatile.clone(),
        validator.clone(),
        mesh.clone(),
        config,
    ));
    TestPlatform {
        store,
        volatile,
        validator,
        mesh,
        state,
    }
}

impl TestPlatform {
    /// Register a user with a session and a token resolving to it.
    pub fn login(&self, id: i64, username: &str, token: &str) -> UserId {
        self.login_with(id, username, token, SessionClaims::default(), true)
    }

    /// Register a user with explicit claims and optional session.
    pub fn login_with(
        &self,
        id: i64,
        username: &str,
        token: &str,
        claims: SessionClaims,
        with_session: bool,
    ) -> UserId {
        let user_id = UserId::from_raw(id);
        self.store.insert_user(User {
            id: user_id,
            username: username.to_string(),
            timezone: "America/Chicago".to_string(),
            otp_enrolled: false,
            otp_validated: false,
        });
        if with_session {
            self.store.insert_session(UserSession {
                user_id,
                created_at: Utc::now(),
                expiration: Utc::now() + Duration::days(30),
            });
        }
        self.validator
            .register(token, ValidatedToken { user_id, claims });
        user_id
    }

    /// Rewrite a user's OTP flags.
    pub fn set_otp(&self, id: i64, enrolled: bool, validated: bool) {
        let user_id = UserId::from_raw(id);
        self.store.insert_user(User {
            id: user_id,
            username: format!("user-{id}"),
            timezone: "America/Chicago".to_string(),
            otp_enrolled: enrolled,
            otp_validated: validated,
        });
    }

    /// Register an active workspace + agent pair serving a byte attempt.
    pub fn seed_workspace(
        &self,
        workspace: i64,
        owner: UserId,
        byte_attempt: i64,
        agent: i64,
        secret: &str,
        state: WorkspaceState,
    ) {
        self.store.insert_workspace(
            WorkspaceRecord {
                id: WorkspaceId::from_raw(workspace),
                owner_id: owner,
                byte_attempt_id: ByteAttemptId::from_raw(byte_attempt),
                state,
                expiration: Utc::now() + Duration::minutes(5),
            },
            vec![AgentRecord {
                id: AgentId::from_raw(agent),
                secret: secret.to_string(),
                created_at: Utc::now(),
            }],
        );
    }
}
