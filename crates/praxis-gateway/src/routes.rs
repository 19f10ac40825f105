//! Router configuration.
//!
//! This module assembles the Axum router: core routes, the agent-facing
//! sub-router, and the middleware pipeline in its load-bearing order.

use std::any::Any;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, internal, ws};
use crate::middleware::{agent, cache, cdn, init, rate_limit, session};
use crate::respond::json_response;
use crate::state::GatewayState;

/// Create the gateway router with the core routes.
///
/// # Routes
///
/// ## Public
/// - `GET /ping` - Liveness probe
/// - `GET /healthz` - Readiness probe (database ping)
///
/// ## Hybrid
/// - `GET /api/ws` - Master websocket upgrade
///
/// ## Agent-authenticated
/// - `POST /internal/v1/ws/init-state` - Workspace init step completed
/// - `POST /internal/v1/ws/init-failure` - Workspace init failed
pub fn create_router(state: Arc<GatewayState>) -> Router {
    create_router_with_routes(state, Router::new())
}

/// Create the gateway router and merge the business endpoint adapters in
/// before the middleware pipeline is applied, so they run behind the same
/// layers as the core routes.
pub fn create_router_with_routes(
    state: Arc<GatewayState>,
    business: Router<Arc<GatewayState>>,
) -> Router {
    let cors = build_cors_layer(&state);

    let agent_routes = Router::new()
        .route("/init-state", post(internal::workspace_init_step))
        .route("/init-failure", post(internal::workspace_init_failure))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            agent::authenticate_agent,
        ));

    Router::new()
        .route("/ping", get(health::ping))
        .route("/healthz", get(health::healthz))
        .route("/api/ws", get(ws::master_websocket))
        .nest("/internal/v1/ws", agent_routes)
        .merge(business)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(
                    panic_response as fn(Box<dyn Any + Send + 'static>) -> Response,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn(options_short_circuit))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit::rate_limit,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    cdn::cdn_admission,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    session::authenticate,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    init::init_request,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    cache::auto_cache,
                )),
        )
        .with_state(state)
}

/// Build the CORS layer from the configured origin allow-list.
///
/// Credentials are allowed, so the origin must be matched explicitly and
/// request headers are mirrored rather than wildcarded.
fn build_cors_layer(state: &Arc<GatewayState>) -> CorsLayer {
    let matchers = state.origin_matchers();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin
                .to_str()
                .is_ok_and(|origin| matchers.iter().any(|m| m.is_match(origin)))
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Answer every `OPTIONS` call with an empty 200 so the CORS configuration
/// owns the header response. Preflights never reach the rest of the
/// pipeline.
async fn options_short_circuit(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return Response::new(axum::body::Body::empty());
    }
    next.run(request).await
}

/// Convert a recovered panic into the uniform 500 envelope. Detail goes to
/// the log, never to the client.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "recovered from panic");

    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({"message": "Internal Server Error"}),
    )
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
