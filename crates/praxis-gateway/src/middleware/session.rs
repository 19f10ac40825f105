//! Session authentication.
//!
//! Turns a bearer cookie into an authenticated user and session in request
//! extensions, enforcing the route class and the multi-stage login state
//! machine on the way.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use cookie::Cookie;

use praxis_auth::{revocation_cookie, AuthError, AUTH_COOKIE, EPHEMERAL_COOKIE};

use crate::classify::{classify, RouteClass};
use crate::context::AuthSession;
use crate::respond::{fail, RequestMeta};
use crate::state::GatewayState;

/// Response message for a private route with no cookie.
const LOGIN_REQUIRED: &str = "You must be logged in to access the GIGO system.";

/// The GitHub-partial quarantine admits only the confirmation endpoint.
const GITHUB_CONFIRM_PATH: &str = "/api/auth/confirmLoginWithGithub";

/// The OTP-partial quarantine admits only these endpoints.
const OTP_PARTIAL_PATHS: [&str; 3] = [
    "/api/auth/validate",
    "/api/otp/validate",
    "/api/otp/generateUserOtpUri",
];

/// Paths where a missing server session must not revoke the cookie: these
/// API families are driven outside the normal frontend request flow, so a
/// revocation there would lose login context without surfacing a logout.
const SESSION_EXEMPT_PREFIXES: [&str; 3] = ["/api/ws", "/api/implicit", "/api/recordUsage"];

/// Authenticate the session cookie according to the route class.
pub async fn authenticate(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let class = classify(&path);
    let meta = RequestMeta::of(&request);

    let Some(token) = session_token(&request) else {
        if class == RouteClass::Private {
            return fail(
                &meta,
                StatusCode::FORBIDDEN,
                LOGIN_REQUIRED,
                "auth cookie is not present",
                None,
            );
        }
        return next.run(request).await;
    };

    // Public routes never validate, even when a cookie rides along.
    if class == RouteClass::Public {
        return next.run(request).await;
    }

    let validated = match state.validator.validate(&token).await {
        Ok(validated) => validated,
        Err(e @ (AuthError::Internal(_) | AuthError::MissingSubject)) => {
            return fail(
                &meta,
                StatusCode::INTERNAL_SERVER_ERROR,
                "logout",
                "failed to validate authentication token",
                Some(&e),
            );
        }
        Err(e) => {
            return fail(
                &meta,
                StatusCode::FORBIDDEN,
                "logout",
                "authentication token invalid",
                Some(&e),
            );
        }
    };

    let user = match state.store.user_by_id(validated.user_id).await {
        Ok(Some(user)) => Arc::new(user),
        Ok(None) => {
            return fail(
                &meta,
                StatusCode::INTERNAL_SERVER_ERROR,
                "logout",
                "failed to find user in database",
                None,
            );
        }
        Err(e) => {
            return fail(
                &meta,
                StatusCode::INTERNAL_SERVER_ERROR,
                "logout",
                "failed to query for user",
                Some(&e),
            );
        }
    };

    // GitHub-partial login: only the confirmation endpoint is reachable,
    // and it runs with the user but no session.
    if validated.claims.login_with_github {
        if path != GITHUB_CONFIRM_PATH {
            return fail(
                &meta,
                StatusCode::FORBIDDEN,
                "logout",
                "partial github login attempted to access protected endpoint",
                None,
            );
        }
        request.extensions_mut().insert(AuthSession {
            user,
            session: None,
        });
        return next.run(request).await;
    }

    if user.otp_enrolled {
        if user.otp_validated && path != "/api/otp/validate" {
            // Enrollment is complete: the claim must prove the second factor
            // ran for this session.
            if !validated.claims.otp_valid {
                return fail(
                    &meta,
                    StatusCode::FORBIDDEN,
                    "logout",
                    "otp has not been validated for this session",
                    None,
                );
            }
        } else if !OTP_PARTIAL_PATHS.contains(&path.as_str()) {
            return fail(
                &meta,
                StatusCode::FORBIDDEN,
                "logout",
                "partial setup otp user attempted to access quarantined endpoint",
                None,
            );
        }
    }

    match state.store.session_for_user(user.id).await {
        Ok(Some(session)) => {
            request.extensions_mut().insert(AuthSession {
                user,
                session: Some(session),
            });
            next.run(request).await
        }
        Ok(None) => {
            if SESSION_EXEMPT_PREFIXES
                .iter()
                .any(|prefix| path.starts_with(prefix))
            {
                request.extensions_mut().insert(AuthSession {
                    user,
                    session: None,
                });
                return next.run(request).await;
            }

            tracing::warn!(ip = %meta.ip, "cookie revoked");
            let mut response = fail(
                &meta,
                StatusCode::UNAUTHORIZED,
                "logout",
                "user not logged in",
                None,
            );
            let revocation =
                revocation_cookie(&state.config.domain, state.config.development_mode);
            if let Ok(value) = revocation.to_string().parse() {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
        Err(e) => fail(
            &meta,
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error occurred",
            "failed to load session",
            Some(&e),
        ),
    }
}

/// Pull the session token out of the auth cookie, falling back to the
/// ephemeral cookie.
fn session_token(request: &Request) -> Option<String> {
    let mut ephemeral = None;
    for header in request.headers().get_all(header::COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for cookie in Cookie::split_parse(raw).flatten() {
            if cookie.name() == AUTH_COOKIE {
                return Some(cookie.value().to_string());
            }
            if cookie.name() == EPHEMERAL_COOKIE {
                ephemeral = Some(cookie.value().to_string());
            }
        }
    }
    ephemeral
}
