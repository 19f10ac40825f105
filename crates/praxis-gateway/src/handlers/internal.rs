//! Agent-facing adapters on the internal sub-router.
//!
//! These are thin: the agent authenticator has already established the
//! caller's identity, and the workspace-lifecycle collaborators that
//! consume these signals live outside the gateway core.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Extension;

use crate::context::AgentIdentity;
use crate::respond::{success, RequestMeta};

/// An agent reports one completed workspace initialization step.
pub async fn workspace_init_step(
    Extension(identity): Extension<AgentIdentity>,
    request: Request,
) -> Response {
    tracing::info!(
        workspace = %identity.workspace_id,
        agent = %identity.agent_id,
        owner = %identity.owner_id,
        "workspace initialization step completed",
    );
    success(
        &RequestMeta::of(&request),
        StatusCode::OK,
        &serde_json::json!({"message": "init state recorded"}),
    )
}

/// An agent reports a failed workspace initialization.
pub async fn workspace_init_failure(
    Extension(identity): Extension<AgentIdentity>,
    request: Request,
) -> Response {
    tracing::error!(
        workspace = %identity.workspace_id,
        agent = %identity.agent_id,
        owner = %identity.owner_id,
        "workspace initialization failed",
    );
    success(
        &RequestMeta::of(&request),
        StatusCode::OK,
        &serde_json::json!({"message": "init failure recorded"}),
    )
}
