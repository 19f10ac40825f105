//! Records exchanged with the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use praxis_core::{AgentId, ByteAttemptId, UserId, WorkspaceId};

/// A platform user, loaded from the store on every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,
    /// Unique username.
    pub username: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Whether the user has enrolled a one-time-password second factor.
    pub otp_enrolled: bool,
    /// Whether the enrolled second factor has been confirmed.
    pub otp_validated: bool,
}

/// A server-side session record, keyed by user ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Owning user.
    pub user_id: UserId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session expires.
    pub expiration: DateTime<Utc>,
}

/// Lifecycle state of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceState {
    /// Provisioning; the agent is not reachable yet.
    Starting,
    /// Live and reachable through the mesh.
    Active,
    /// Shutting down.
    Stopping,
    /// Stopped but resumable.
    Stopped,
    /// Failed to provision or crashed.
    Failed,
}

impl WorkspaceState {
    /// Whether the workspace counts as live for expiration extension.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }
}

/// A workspace row together with its owning byte attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    /// Workspace ID.
    pub id: WorkspaceId,
    /// Owning user.
    pub owner_id: UserId,
    /// The byte attempt this workspace serves.
    pub byte_attempt_id: ByteAttemptId,
    /// Current lifecycle state.
    pub state: WorkspaceState,
    /// When the workspace is reclaimed unless extended.
    pub expiration: DateTime<Utc>,
}

/// A workspace agent row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent ID.
    pub id: AgentId,
    /// Bearer secret the agent authenticates with.
    pub secret: String,
    /// When the agent registered; the newest agent is authoritative.
    pub created_at: DateTime<Utc>,
}

/// Everything needed to dial the agent serving a byte attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCredentials {
    /// Agent ID, used as the mesh dial identity.
    pub agent_id: AgentId,
    /// Bearer secret presented to the agent.
    pub secret: String,
    /// The workspace hosting the agent.
    pub workspace_id: WorkspaceId,
    /// State of that workspace.
    pub workspace_state: WorkspaceState,
}

/// One file of a byte attempt's working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    /// Path of the file relative to the exercise root.
    pub file_name: String,
    /// Full file content.
    pub content: String,
}

/// Content difficulty of a byte attempt.
///
/// Selects which files column a code update lands in. Unknown wire values
/// fall back to `Medium`, matching the column fallback in the store schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "u8")]
pub enum Difficulty {
    /// Easy variant of the exercise.
    Easy,
    /// Default variant.
    #[default]
    Medium,
    /// Hard variant.
    Hard,
}

impl Difficulty {
    /// The column suffix for this difficulty.
    #[must_use]
    pub const fn column_suffix(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        Ok(match raw {
            0 => Self::Easy,
            2 => Self::Hard,
            _ => Self::Medium,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_unknown_falls_back_to_medium() {
        let parsed: Difficulty = serde_json::from_str("9").unwrap();
        assert_eq!(parsed, Difficulty::Medium);
        assert_eq!(parsed.column_suffix(), "medium");
    }

    #[test]
    fn difficulty_round_trip() {
        for (difficulty, wire) in [
            (Difficulty::Easy, "0"),
            (Difficulty::Medium, "1"),
            (Difficulty::Hard, "2"),
        ] {
            assert_eq!(serde_json::to_string(&difficulty).unwrap(), wire);
            let back: Difficulty = serde_json::from_str(wire).unwrap();
            assert_eq!(back, difficulty);
        }
    }

    #[test]
    fn workspace_liveness() {
        assert!(WorkspaceState::Starting.is_live());
        assert!(WorkspaceState::Active.is_live());
        assert!(!WorkspaceState::Stopped.is_live());
        assert!(!WorkspaceState::Failed.is_live());
    }
}
