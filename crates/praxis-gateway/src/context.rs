//! Request-scoped values carried in extensions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Request;
use axum::http::HeaderMap;

use praxis_core::{AgentId, RequestId, UserId, WorkspaceId};
use praxis_store::{User, UserSession};

/// Identity of the authenticated caller, attached by the session
/// authenticator.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// The authenticated user.
    pub user: Arc<User>,
    /// The server-side session record. Absent for GitHub-partial logins and
    /// on the session-exempt paths.
    pub session: Option<UserSession>,
}

/// Per-request bookkeeping, attached by the request initializer.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// The request ID.
    pub id: RequestId,
}

/// The captured request body, attached by the request initializer so the
/// cache layer can derive keys without re-reading the wire.
#[derive(Debug, Clone)]
pub struct BufferedBody(pub Bytes);

/// Identity of an authenticated workspace agent, attached by the agent
/// authenticator.
#[derive(Debug, Clone, Copy)]
pub struct AgentIdentity {
    /// The workspace the agent serves.
    pub workspace_id: WorkspaceId,
    /// The agent itself.
    pub agent_id: AgentId,
    /// The user owning the workspace.
    pub owner_id: UserId,
}

/// Best-effort caller IP: the first `X-Forwarded-For` hop when present
/// (the listener sits behind a CDN and load balancer), otherwise the peer
/// address recorded at accept time.
#[must_use]
pub fn client_ip(request: &Request) -> String {
    forwarded_ip(request.headers()).unwrap_or_else(|| {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    })
}

/// The first `X-Forwarded-For` hop, if any.
#[must_use]
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = forwarded.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

/// Username and user ID for log lines: `anon`/`-1` when unauthenticated.
#[must_use]
pub fn log_identity(session: Option<&AuthSession>) -> (String, String) {
    session.map_or_else(
        || ("anon".to_string(), "-1".to_string()),
        |auth| (auth.user.username.clone(), auth.user.id.to_string()),
    )
}
