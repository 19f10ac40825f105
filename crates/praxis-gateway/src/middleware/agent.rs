//! Workspace agent authentication for the internal sub-router.
//!
//! Agents authenticate with a workspace-scoped bearer secret rather than a
//! session cookie. The newest agent registered for the workspace is
//! authoritative.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use praxis_core::WorkspaceId;

use crate::context::AgentIdentity;
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;

/// Header carrying the agent's bearer secret.
pub const AGENT_TOKEN_HEADER: &str = "Gigo-Agent-Token";

/// Header carrying the workspace ID the agent claims to serve.
pub const WORKSPACE_ID_HEADER: &str = "Gigo-Workspace-Id";

/// Authenticate a workspace agent and attach its identity to the request.
pub async fn authenticate_agent(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let meta = RequestMeta::of(&request);

    let token = request
        .headers()
        .get(AGENT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if token.is_empty() {
        return unauthorized(&meta, "agent token required", "agent token missing");
    }

    let raw_workspace = request
        .headers()
        .get(WORKSPACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if raw_workspace.is_empty() {
        return unauthorized(&meta, "workspace id required", "workspace id missing");
    }
    let Ok(workspace_id) = raw_workspace.parse::<WorkspaceId>() else {
        return unauthorized(&meta, "invalid workspace id", "invalid workspace id");
    };

    match state.store.newest_agent(workspace_id).await {
        Ok(Some((agent_id, secret, owner_id)))
            if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) =>
        {
            request.extensions_mut().insert(AgentIdentity {
                workspace_id,
                agent_id,
                owner_id,
            });
            next.run(request).await
        }
        Ok(_) => unauthorized(&meta, "agent not found", "agent not found"),
        Err(e) => fail(
            &meta,
            StatusCode::UNAUTHORIZED,
            "failed to authenticate agent",
            "failed to authenticate agent",
            Some(&e),
        ),
    }
}

fn unauthorized(meta: &RequestMeta, public: &str, internal: &str) -> Response {
    fail(meta, StatusCode::UNAUTHORIZED, public, internal, None)
}
