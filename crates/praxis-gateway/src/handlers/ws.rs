//! The master websocket upgrade endpoint.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Extension;

use crate::context::{forwarded_ip, log_identity, AuthSession, RequestContext};
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;
use crate::ws::socket::{run_master_socket, HandlerRegistry, MAX_FRAME_BYTES};

/// Upgrade `GET /api/ws` to the master websocket.
///
/// The endpoint is hybrid: anonymous callers get a connection without the
/// user poller. The origin must pass the allow-list before upgrading, and
/// the connection runs on a fresh cancellation root because the request
/// context dies as soon as this handler returns.
pub async fn master_websocket(
    State(state): State<Arc<GatewayState>>,
    auth: Option<Extension<AuthSession>>,
    request_context: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = auth.map(|Extension(auth)| auth);
    let (username, user_id) = log_identity(auth.as_ref());
    let meta = RequestMeta {
        endpoint: "/api/ws".to_string(),
        method: "GET".to_string(),
        request_id: request_context.map(|Extension(context)| context.id),
        ip: forwarded_ip(&headers).unwrap_or_else(|| "unknown".to_string()),
        username,
        user_id,
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.origin_allowed(origin) {
        return fail(
            &meta,
            StatusCode::FORBIDDEN,
            "forbidden",
            "invalid origin",
            None,
        );
    }

    let user = auth.map(|auth| auth.user.clone());
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| run_master_socket(state, socket, user, HandlerRegistry::new()))
}
