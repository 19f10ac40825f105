//! Uniform response construction.
//!
//! Every failure in the middleware chain and the handlers funnels through
//! [`fail`]: one JSON envelope on the wire, one structured log line
//! internally. Internal detail never reaches the client.

use std::fmt;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use praxis_core::RequestId;

use crate::context::{client_ip, log_identity, AuthSession, RequestContext};

/// Call-site metadata for response logging.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// URL path being served.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Request ID, once the initializer has assigned one.
    pub request_id: Option<RequestId>,
    /// Caller IP.
    pub ip: String,
    /// Caller username, `anon` when unauthenticated.
    pub username: String,
    /// Caller user ID, `-1` when unauthenticated.
    pub user_id: String,
}

impl RequestMeta {
    /// Gather metadata from a request and whatever extensions the earlier
    /// layers have attached.
    #[must_use]
    pub fn of(request: &Request) -> Self {
        let (username, user_id) = log_identity(request.extensions().get::<AuthSession>());
        Self {
            endpoint: request.uri().path().to_string(),
            method: request.method().to_string(),
            request_id: request.extensions().get::<RequestContext>().map(|c| c.id),
            ip: client_ip(request),
            username,
            user_id,
        }
    }
}

/// Write an error response: JSON envelope out, structured log line in.
pub fn fail(
    meta: &RequestMeta,
    status: StatusCode,
    public_message: &str,
    internal_message: &str,
    source: Option<&dyn fmt::Display>,
) -> Response {
    tracing::error!(
        endpoint = %meta.endpoint,
        method = %meta.method,
        request_id = ?meta.request_id,
        ip = %meta.ip,
        username = %meta.username,
        user_id = %meta.user_id,
        status = status.as_u16(),
        error = source.map(ToString::to_string).as_deref().unwrap_or(""),
        "{internal_message}",
    );

    json_response(status, &serde_json::json!({ "message": public_message }))
}

/// Write a success response and log it at debug level.
pub fn success(meta: &RequestMeta, status: StatusCode, body: &serde_json::Value) -> Response {
    tracing::debug!(
        endpoint = %meta.endpoint,
        method = %meta.method,
        request_id = ?meta.request_id,
        ip = %meta.ip,
        username = %meta.username,
        user_id = %meta.user_id,
        status = status.as_u16(),
        "request served",
    );

    json_response(status, body)
}

/// Serialize a JSON body with the right content type.
///
/// Serialization of a `serde_json::Value` cannot fail; the empty-body
/// fallback exists to keep this function total.
#[must_use]
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
