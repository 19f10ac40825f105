//! CDN admission control.
//!
//! When enforcement is on, a request is admitted either by presenting the
//! CDN shared secret or by arriving from a whitelisted IP range. Everything
//! else is rejected before it reaches authentication.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::context::client_ip;
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;

/// Header the CDN attaches its shared secret in.
pub const CDN_ACCESS_HEADER: &str = "X-CDN-SECRET";

/// Block connections that arrived neither through the CDN nor from a
/// whitelisted range.
pub async fn cdn_admission(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.force_cdn {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get(CDN_ACCESS_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let secret = state.config.cdn_secret.as_str();
    if !secret.is_empty() && bool::from(key.as_bytes().ct_eq(secret.as_bytes())) {
        return next.run(request).await;
    }

    // A wrong key is rejected outright, whitelisted source or not.
    if !key.is_empty() {
        return forbidden(&request, "invalid cdn key");
    }

    let ip = client_ip(&request);
    let Ok(parsed) = ip.parse::<IpAddr>() else {
        return forbidden(&request, "invalid ip address");
    };

    if state
        .config
        .cdn_whitelist
        .iter()
        .any(|range| range.contains(parsed))
    {
        return next.run(request).await;
    }

    forbidden(&request, "ip address not whitelisted")
}

fn forbidden(request: &Request, internal: &str) -> Response {
    fail(
        &RequestMeta::of(request),
        StatusCode::FORBIDDEN,
        "forbidden",
        internal,
        None,
    )
}
