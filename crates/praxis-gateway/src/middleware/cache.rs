//! The auto-cache layer.
//!
//! Lookup runs before the handlers; population and invalidation run on the
//! response path. The whole layer is driven by the descriptor table in
//! [`crate::cache`] — no endpoint-specific logic lives here.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use praxis_core::UserId;

use crate::cache::{match_descriptor, CacheDescriptor, CachedResponse, CACHE_ENDPOINTS};
use crate::context::{AuthSession, BufferedBody};
use crate::respond::{fail, success, RequestMeta};
use crate::state::GatewayState;

/// Serve cacheable endpoints from the volatile store, record their
/// responses, and fire cross-endpoint invalidations.
pub async fn auto_cache(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let meta = RequestMeta::of(&request);
    let user = request
        .extensions()
        .get::<AuthSession>()
        .map(|auth| auth.user.id);

    let mut ticket: Option<(&'static CacheDescriptor, String)> = None;
    if let Some(descriptor) = match_descriptor(&path, &method) {
        let body = request
            .extensions()
            .get::<BufferedBody>()
            .map(|buffered| buffered.0.clone());
        if !descriptor.key_fields.is_empty() && body.is_none() {
            return fail(
                &meta,
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
                "missing request body buffer",
                None,
            );
        }

        let key = match descriptor.derive_key(&path, &method, user, body.as_deref()) {
            Ok(key) => key,
            Err(e) => {
                return fail(
                    &meta,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error",
                    "failed to derive cache key",
                    Some(&e),
                );
            }
        };

        if let Some(response) = serve_hit(&state, &meta, descriptor, &key).await {
            invalidate(&state, &path, user, response.status()).await;
            return response;
        }

        ticket = Some((descriptor, key));
    }

    let mut response = next.run(request).await;

    if let Some((descriptor, key)) = ticket {
        response = record(&state, descriptor, &key, response).await;
    }
    invalidate(&state, &path, user, response.status()).await;
    response
}

/// Try to serve a request from the cache. `None` means miss.
async fn serve_hit(
    state: &GatewayState,
    meta: &RequestMeta,
    descriptor: &CacheDescriptor,
    key: &str,
) -> Option<Response> {
    let blob = match state.volatile.get(key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to check cache");
            return None;
        }
    };

    let cached = serde_json::from_slice::<CachedResponse>(&blob).ok();
    match cached {
        Some(cached) if cached.is_valid() => {
            let status =
                StatusCode::from_u16(cached.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = cached.body.unwrap_or(serde_json::Value::Null);
            let response = success(meta, status, &body);

            if descriptor.refresh_on_hit {
                match state.volatile.expire(key, descriptor.ttl).await {
                    Ok(_) => {}
                    Err(e) => tracing::warn!(key, error = %e, "failed to update cache ttl"),
                }
            }
            Some(response)
        }
        _ => {
            tracing::error!(key, "invalid cached response");
            if let Err(e) = state.volatile.remove(key).await {
                tracing::warn!(key, error = %e, "failed to drop invalid cache entry");
            }
            None
        }
    }
}

/// Record a successful JSON response under the derived key. Failures are
/// logged only; the response has already been decided.
async fn record(
    state: &GatewayState,
    descriptor: &CacheDescriptor,
    key: &str,
    response: Response,
) -> Response {
    if !response.status().is_success() || !is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key, error = %e, "failed to buffer response for caching");
            return Response::from_parts(parts, Body::empty());
        }
    };

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        let blob = serde_json::to_vec(&CachedResponse {
            body: Some(value),
            status: parts.status.as_u16(),
        })
        .unwrap_or_default();
        if let Err(e) = state.volatile.put(key, blob, descriptor.ttl).await {
            tracing::error!(key, error = %e, "failed to save response to cache");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Evict whatever the descriptors whose `invalidate_on` matches this path
/// would have cached for this user. The derivation drops the body
/// fingerprint, so every fingerprint variant under the prefix goes.
async fn invalidate(state: &GatewayState, path: &str, user: Option<UserId>, status: StatusCode) {
    if !status.is_success() {
        return;
    }

    for descriptor in CACHE_ENDPOINTS.iter() {
        let Some(pattern) = &descriptor.invalidate_on else {
            continue;
        };
        if !pattern.is_match(path) {
            continue;
        }

        let base = descriptor.invalidation_key(user);
        if let Err(e) = state.volatile.remove(&base).await {
            tracing::error!(key = %base, error = %e, "failed to invalidate cache");
            continue;
        }
        match state.volatile.remove_prefix(&format!("{base}:")).await {
            Ok(count) if count > 0 => {
                tracing::debug!(key = %base, count, "invalidated cache entries");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(key = %base, error = %e, "failed to invalidate cache"),
        }
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}
