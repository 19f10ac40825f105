//! Request initialization.
//!
//! Assigns the request ID, captures the body into a pooled buffer under the
//! hard size cap, annotates the trace span, and logs the call.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use futures::StreamExt;
use tracing::Instrument;

use crate::config::MAX_BODY_BYTES;
use crate::context::{client_ip, log_identity, AuthSession, BufferedBody, RequestContext};
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;

/// Initialize the request before it reaches the cache layer and handlers.
pub async fn init_request(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = state.snowflake.generate();
    let ip = client_ip(&request);
    let (username, user_id) = log_identity(request.extensions().get::<AuthSession>());
    let authenticated = request.extensions().get::<AuthSession>().is_some();

    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(RequestContext { id: request_id });

    let meta = RequestMeta {
        endpoint: parts.uri.path().to_string(),
        method: parts.method.to_string(),
        request_id: Some(request_id),
        ip: ip.clone(),
        username: username.clone(),
        user_id: user_id.clone(),
    };

    // Copy the body into a pooled buffer, reading at most one byte past the
    // cap so oversized requests are detected without draining them.
    let mut buffer = state.buffers.get();
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                buffer.extend_from_slice(&bytes);
                if buffer.len() > MAX_BODY_BYTES {
                    break;
                }
            }
            Err(e) => {
                state.buffers.put(buffer);
                return fail(
                    &meta,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to read body",
                    "failed to read body",
                    Some(&e),
                );
            }
        }
    }

    if buffer.len() > MAX_BODY_BYTES {
        state.buffers.put(buffer);
        // The public message predates the cap being lowered to 10MiB and is
        // part of the frozen wire surface.
        return fail(
            &meta,
            StatusCode::PAYLOAD_TOO_LARGE,
            "body too large - max 100MiB",
            "body too large",
            None,
        );
    }

    let bytes = Bytes::copy_from_slice(&buffer);
    state.buffers.put(buffer);
    parts.extensions.insert(BufferedBody(bytes.clone()));

    let request = Request::from_parts(parts, Body::from(bytes));

    let span = tracing::debug_span!(
        "api_call",
        request_id = %request_id,
        ip = %ip,
        username = %username,
        user_id = %user_id,
        authenticated,
    );

    if !matches!(meta.endpoint.as_str(), "/ping" | "/healthz") || meta.method != "GET" {
        let headers = serialized_headers(&request);
        tracing::debug!(
            parent: &span,
            endpoint = %meta.endpoint,
            method = %meta.method,
            headers = %headers,
            "api call initiated",
        );
    }

    next.run(request).instrument(span).await
}

fn serialized_headers(request: &Request) -> String {
    let map: serde_json::Map<String, serde_json::Value> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}
