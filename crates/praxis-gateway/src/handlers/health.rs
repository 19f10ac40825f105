//! Liveness probes for the load balancer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::respond::json_response;
use crate::state::GatewayState;

/// How long the health check waits on the database.
const DB_PING_TIMEOUT: Duration = Duration::from_millis(300);

/// Liveness probe; answers without touching any collaborator.
pub async fn ping() -> Response {
    json_response(StatusCode::OK, &serde_json::json!({"status": "running"}))
}

/// Readiness probe; pings the database with a short timeout.
pub async fn healthz(State(state): State<Arc<GatewayState>>) -> Response {
    match tokio::time::timeout(DB_PING_TIMEOUT, state.store.ping()).await {
        Ok(Ok(())) => json_response(StatusCode::OK, &serde_json::json!({"health": "ok"})),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "healthz database ping failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"health": "not ok"}),
            )
        }
        Err(_) => {
            tracing::error!("healthz database ping timed out");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"health": "not ok"}),
            )
        }
    }
}
