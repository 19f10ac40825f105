//! Per-IP rate limiting against the volatile store.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::context::client_ip;
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;

/// One fixed window per counter.
const WINDOW: Duration = Duration::from_secs(60);

/// Enforce the per-IP request budget.
///
/// Counters live in the volatile store so the budget holds across the fleet.
/// `OPTIONS` is never counted; preflights are the browser's traffic, not the
/// caller's.
pub async fn rate_limit(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    let key = format!("praxis-core-api-{ip}");

    match state.volatile.incr(&key, WINDOW).await {
        Ok(count) if count > u64::from(state.config.rate_limit_per_minute) => fail(
            &RequestMeta::of(&request),
            StatusCode::TOO_MANY_REQUESTS,
            "too many requests",
            &format!("too many requests: {count} in window"),
            None,
        ),
        Ok(_) => next.run(request).await,
        Err(e) => fail(
            &RequestMeta::of(&request),
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error",
            "failed to limit api call",
            Some(&e),
        ),
    }
}
