//! End-to-end tests for the middleware pipeline.
//!
//! Every test drives the full router — panic recovery through auto-cache —
//! against the in-memory backends, with probe endpoints standing in for the
//! business adapters.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::post;
use axum::{Json, Router};
use axum_test::TestServer;
use cookie::Cookie;
use serde_json::{json, Value};

use praxis_gateway::cache::{match_descriptor, CachedResponse};
use praxis_gateway::{create_router_with_routes, GatewayConfig, GatewayState};
use praxis_store::WorkspaceState;

use common::{platform, TestPlatform};

/// Counters observing how often each probe endpoint actually ran.
#[derive(Default)]
struct Invocations {
    project_get: AtomicUsize,
    project_create: AtomicUsize,
    user_get_id: AtomicUsize,
}

fn probe_routes(invocations: Arc<Invocations>) -> Router<Arc<GatewayState>> {
    let project_get = invocations.clone();
    let project_create = invocations.clone();
    let user_get_id = invocations;

    Router::new()
        .route(
            "/api/project/get",
            post(move || {
                let invocations = project_get.clone();
                async move {
                    let n = invocations.project_get.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({"post": {"_id": "69"}, "invocation": n}))
                }
            }),
        )
        .route(
            "/api/project/editProject",
            post(|| async { Json(json!({"message": "Edit Successful"})) }),
        )
        .route(
            "/api/project/create",
            post(move || {
                let invocations = project_create.clone();
                async move {
                    invocations.project_create.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"message": "Project Created"}))
                }
            }),
        )
        .route(
            "/api/user/getId",
            post(move || {
                let invocations = user_get_id.clone();
                async move {
                    let n = invocations.user_get_id.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({"id": "163045671337", "invocation": n}))
                }
            }),
        )
        .route(
            "/api/otp/validate",
            post(|| async { Json(json!({"message": "otp valid"})) }),
        )
        .route(
            "/api/auth/confirmLoginWithGithub",
            post(|| async { Json(json!({"message": "github login confirmed"})) }),
        )
        .route(
            "/api/recordUsage",
            post(|| async { Json(json!({"message": "usage recorded"})) }),
        )
        .route("/api/auth/loginPanic", post(panicking_login))
}

async fn panicking_login() -> Json<Value> {
    panic!("login handler exploded")
}

fn server(platform: &TestPlatform, invocations: Arc<Invocations>) -> TestServer {
    let app = create_router_with_routes(platform.state.clone(), probe_routes(invocations));
    TestServer::new(app).expect("test server")
}

fn auth_cookie(token: &str) -> Cookie<'static> {
    Cookie::new("gigoAuthToken", token.to_string())
}

fn forwarded_for(ip: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(ip).expect("header value"),
    )
}

// =============================================================================
// Liveness & fallback
// =============================================================================

#[tokio::test]
async fn public_ping_needs_no_cookie() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server.get("/ping").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!({"status": "running"}));
}

#[tokio::test]
async fn healthz_reflects_database_health() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!({"health": "ok"}));

    platform.store.set_healthy(false);
    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(response.json::<Value>(), json!({"health": "not ok"}));
}

#[tokio::test]
async fn unmatched_route_is_404_for_authenticated_caller() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .get("/definitely/not/a/route")
        .add_cookie(auth_cookie("tok42"))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn options_short_circuits_with_200() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server.method(Method::OPTIONS, "/api/project/editProject").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn panic_in_handler_becomes_500_envelope() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server.post("/api/auth/loginPanic").await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "Internal Server Error"})
    );
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn rate_limit_exhaustion_returns_429() {
    let config = GatewayConfig {
        rate_limit_per_minute: 3,
        ..GatewayConfig::default()
    };
    let platform = platform(config);
    let server = server(&platform, Arc::new(Invocations::default()));
    let (name, value) = forwarded_for("198.51.100.1");

    for _ in 0..3 {
        let response = server
            .get("/ping")
            .add_header(name.clone(), value.clone())
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let response = server
        .get("/ping")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(response.json::<Value>(), json!({"message": "too many requests"}));
}

#[tokio::test]
async fn rate_limit_buckets_are_per_ip() {
    let config = GatewayConfig {
        rate_limit_per_minute: 2,
        ..GatewayConfig::default()
    };
    let platform = platform(config);
    let server = server(&platform, Arc::new(Invocations::default()));

    let (name, a) = forwarded_for("198.51.100.1");
    for _ in 0..2 {
        server.get("/ping").add_header(name.clone(), a.clone()).await;
    }
    let exhausted = server.get("/ping").add_header(name.clone(), a.clone()).await;
    assert_eq!(exhausted.status_code(), 429);

    let (_, b) = forwarded_for("198.51.100.2");
    let fresh = server.get("/ping").add_header(name.clone(), b).await;
    assert_eq!(fresh.status_code(), 200);
}

#[tokio::test]
async fn options_is_never_counted() {
    let config = GatewayConfig {
        rate_limit_per_minute: 1,
        ..GatewayConfig::default()
    };
    let platform = platform(config);
    let server = server(&platform, Arc::new(Invocations::default()));
    let (name, value) = forwarded_for("198.51.100.9");

    for _ in 0..5 {
        let response = server
            .method(Method::OPTIONS, "/ping")
            .add_header(name.clone(), value.clone())
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let response = server
        .get("/ping")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn volatile_store_failure_fails_closed() {
    let platform = platform(GatewayConfig::default());
    platform.volatile.set_failing(true);
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server.get("/ping").await;
    assert_eq!(response.status_code(), 500);
}

// =============================================================================
// CDN admission
// =============================================================================

fn cdn_config() -> GatewayConfig {
    GatewayConfig {
        force_cdn: true,
        cdn_secret: "cdn-shared-secret".to_string(),
        cdn_whitelist: vec!["203.0.113.0/24".parse().expect("static range")],
        ..GatewayConfig::default()
    }
}

#[tokio::test]
async fn wrong_cdn_secret_is_rejected() {
    let platform = platform(cdn_config());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .get("/ping")
        .add_header(
            HeaderName::from_static("x-cdn-secret"),
            HeaderValue::from_static("wrong"),
        )
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(response.json::<Value>(), json!({"message": "forbidden"}));
}

#[tokio::test]
async fn valid_cdn_secret_is_admitted() {
    let platform = platform(cdn_config());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .get("/ping")
        .add_header(
            HeaderName::from_static("x-cdn-secret"),
            HeaderValue::from_static("cdn-shared-secret"),
        )
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn whitelisted_ip_bypasses_the_cdn() {
    let platform = platform(cdn_config());
    let server = server(&platform, Arc::new(Invocations::default()));

    let (name, inside) = forwarded_for("203.0.113.77");
    let response = server.get("/ping").add_header(name.clone(), inside).await;
    assert_eq!(response.status_code(), 200);

    let (_, outside) = forwarded_for("198.51.100.1");
    let response = server.get("/ping").add_header(name, outside).await;
    assert_eq!(response.status_code(), 403);
}

// =============================================================================
// Session authentication
// =============================================================================

#[tokio::test]
async fn private_route_without_cookie_is_forbidden() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/api/project/editProject")
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "You must be logged in to access the GIGO system."})
    );
}

#[tokio::test]
async fn invalid_token_on_hybrid_route_logs_out() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("unknown-token"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(response.status_code(), 403);
    assert_eq!(response.json::<Value>(), json!({"message": "logout"}));
}

#[tokio::test]
async fn github_partial_login_is_quarantined() {
    let platform = platform(GatewayConfig::default());
    platform.login_with(
        7,
        "casey",
        "github-partial",
        praxis_auth::SessionClaims {
            otp_valid: false,
            login_with_github: true,
        },
        true,
    );
    let server = server(&platform, Arc::new(Invocations::default()));

    let blocked = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("github-partial"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(blocked.status_code(), 403);
    assert_eq!(blocked.json::<Value>(), json!({"message": "logout"}));

    let allowed = server
        .post("/api/auth/confirmLoginWithGithub")
        .add_cookie(auth_cookie("github-partial"))
        .json(&json!({}))
        .await;
    assert_eq!(allowed.status_code(), 200);
}

#[tokio::test]
async fn otp_partial_user_reaches_only_otp_endpoints() {
    let platform = platform(GatewayConfig::default());
    platform.login(8, "rowan", "otp-partial");
    platform.set_otp(8, true, false);
    let server = server(&platform, Arc::new(Invocations::default()));

    let blocked = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("otp-partial"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(blocked.status_code(), 403);
    assert_eq!(blocked.json::<Value>(), json!({"message": "logout"}));

    let allowed = server
        .post("/api/otp/validate")
        .add_cookie(auth_cookie("otp-partial"))
        .json(&json!({"otp_code": "123456"}))
        .await;
    assert_eq!(allowed.status_code(), 200);
}

#[tokio::test]
async fn otp_required_session_needs_the_claim() {
    let platform = platform(GatewayConfig::default());
    platform.login(9, "sage", "otp-missing-claim");
    platform.set_otp(9, true, true);
    platform.login_with(
        9,
        "sage",
        "otp-claimed",
        praxis_auth::SessionClaims {
            otp_valid: true,
            login_with_github: false,
        },
        true,
    );
    platform.set_otp(9, true, true);
    let server = server(&platform, Arc::new(Invocations::default()));

    let blocked = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("otp-missing-claim"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(blocked.status_code(), 403);
    assert_eq!(blocked.json::<Value>(), json!({"message": "logout"}));

    // The validate endpoint stays reachable so the second factor can run.
    let validate = server
        .post("/api/otp/validate")
        .add_cookie(auth_cookie("otp-missing-claim"))
        .json(&json!({"otp_code": "123456"}))
        .await;
    assert_eq!(validate.status_code(), 200);

    let allowed = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("otp-claimed"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(allowed.status_code(), 200);
}

#[tokio::test]
async fn missing_server_session_revokes_the_cookie() {
    let platform = platform(GatewayConfig::default());
    platform.login_with(10, "aspen", "no-session", praxis_auth::SessionClaims::default(), false);
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("no-session"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(response.status_code(), 401);
    assert_eq!(response.json::<Value>(), json!({"message": "logout"}));

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.starts_with("gigoAuthToken="));
    assert!(set_cookie.contains("1970"));
}

#[tokio::test]
async fn usage_tracking_path_skips_revocation() {
    let platform = platform(GatewayConfig::default());
    platform.login_with(11, "ari", "no-session", praxis_auth::SessionClaims::default(), false);
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/api/recordUsage")
        .add_cookie(auth_cookie("no-session"))
        .json(&json!({"pages": []}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.headers().get("set-cookie").is_none());
}

// =============================================================================
// Response cache
// =============================================================================

#[tokio::test]
async fn cache_hit_serves_identical_body_with_one_upstream_call() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    let first = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(first.status_code(), 200);
    let first_body = first.json::<Value>();
    assert_eq!(first_body["invocation"], 1);

    let second = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(second.status_code(), 200);
    assert_eq!(second.json::<Value>(), first_body);
    assert_eq!(invocations.project_get.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_body_fields_miss_each_other() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    for post_id in ["69", "70"] {
        let response = server
            .post("/api/project/get")
            .add_cookie(auth_cookie("tok42"))
            .json(&json!({"post_id": post_id}))
            .await;
        assert_eq!(response.status_code(), 200);
    }
    assert_eq!(invocations.project_get.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_is_user_scoped() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    platform.login(43, "finn", "tok43");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    for token in ["tok42", "tok43"] {
        let response = server
            .post("/api/project/get")
            .add_cookie(auth_cookie(token))
            .json(&json!({"post_id": "69"}))
            .await;
        assert_eq!(response.status_code(), 200);
    }
    assert_eq!(invocations.project_get.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn successful_edit_invalidates_and_repopulates() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    let first = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(first.json::<Value>()["invocation"], 1);

    let edit = server
        .post("/api/project/editProject")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69", "title": "renamed"}))
        .await;
    assert_eq!(edit.status_code(), 200);

    let repopulated = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(repopulated.json::<Value>()["invocation"], 2);
    assert_eq!(invocations.project_get.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refresh_on_hit_extends_the_ttl() {
    let platform = platform(GatewayConfig::default());
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    let descriptor = match_descriptor("/api/user/getId", &Method::POST).expect("descriptor");
    let key = descriptor
        .derive_key(
            "/api/user/getId",
            &Method::POST,
            None,
            Some(br#"{"username":"kai"}"#),
        )
        .expect("key");

    // Seed an entry that is about to expire.
    let blob = serde_json::to_vec(&CachedResponse {
        body: Some(json!({"id": "163045671337", "invocation": 99})),
        status: 200,
    })
    .expect("blob");
    use praxis_store::VolatileStore;
    platform
        .volatile
        .put(&key, blob, std::time::Duration::from_secs(60))
        .await
        .expect("seed");

    let response = server
        .post("/api/user/getId")
        .json(&json!({"username": "kai"}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["invocation"], 99);
    assert_eq!(invocations.user_get_id.load(Ordering::SeqCst), 0);

    // The hit pushed the TTL back out to the descriptor's seven days.
    let ttl = platform.volatile.ttl_of(&key).expect("live entry");
    assert!(ttl > std::time::Duration::from_secs(24 * 60 * 60));
}

#[tokio::test]
async fn malformed_cache_entry_is_dropped_and_treated_as_miss() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    let descriptor = match_descriptor("/api/project/get", &Method::POST).expect("descriptor");
    let key = descriptor
        .derive_key(
            "/api/project/get",
            &Method::POST,
            Some(praxis_core::UserId::from_raw(42)),
            Some(br#"{"post_id":"69"}"#),
        )
        .expect("key");

    use praxis_store::VolatileStore;
    platform
        .volatile
        .put(
            &key,
            br#"{"Body":null,"Status":0}"#.to_vec(),
            std::time::Duration::from_secs(300),
        )
        .await
        .expect("seed");

    let response = server
        .post("/api/project/get")
        .add_cookie(auth_cookie("tok42"))
        .json(&json!({"post_id": "69"}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(invocations.project_get.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Body cap
// =============================================================================

#[tokio::test]
async fn oversized_body_is_rejected_before_any_handler() {
    let platform = platform(GatewayConfig::default());
    platform.login(42, "kai", "tok42");
    let invocations = Arc::new(Invocations::default());
    let server = server(&platform, invocations.clone());

    let oversized = vec![b'a'; 10 * 1024 * 1024 + 2];
    let response = server
        .post("/api/project/create")
        .add_cookie(auth_cookie("tok42"))
        .content_type("application/json")
        .bytes(oversized.into())
        .await;
    assert_eq!(response.status_code(), 413);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "body too large - max 100MiB"})
    );
    assert_eq!(invocations.project_create.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Agent authenticator
// =============================================================================

#[tokio::test]
async fn agent_with_valid_secret_is_admitted() {
    let platform = platform(GatewayConfig::default());
    let owner = platform.login(42, "kai", "tok42");
    platform.seed_workspace(10, owner, 100, 5, "agent-secret-uuid", WorkspaceState::Active);
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/internal/v1/ws/init-state")
        .add_header(
            HeaderName::from_static("gigo-agent-token"),
            HeaderValue::from_static("agent-secret-uuid"),
        )
        .add_header(
            HeaderName::from_static("gigo-workspace-id"),
            HeaderValue::from_static("10"),
        )
        .json(&json!({"state": 1}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "init state recorded"})
    );
}

#[tokio::test]
async fn agent_with_wrong_secret_is_rejected() {
    let platform = platform(GatewayConfig::default());
    let owner = platform.login(42, "kai", "tok42");
    platform.seed_workspace(10, owner, 100, 5, "agent-secret-uuid", WorkspaceState::Active);
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/internal/v1/ws/init-state")
        .add_header(
            HeaderName::from_static("gigo-agent-token"),
            HeaderValue::from_static("not-the-secret"),
        )
        .add_header(
            HeaderName::from_static("gigo-workspace-id"),
            HeaderValue::from_static("10"),
        )
        .json(&json!({"state": 1}))
        .await;
    assert_eq!(response.status_code(), 401);
    assert_eq!(response.json::<Value>(), json!({"message": "agent not found"}));
}

#[tokio::test]
async fn agent_without_headers_is_rejected() {
    let platform = platform(GatewayConfig::default());
    let server = server(&platform, Arc::new(Invocations::default()));

    let response = server
        .post("/internal/v1/ws/init-state")
        .json(&json!({"state": 1}))
        .await;
    assert_eq!(response.status_code(), 401);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "agent token required"})
    );
}
