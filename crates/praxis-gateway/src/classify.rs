//! Route permission classification.
//!
//! Every URL path belongs to exactly one class. Classification checks the
//! public table first, then the hybrid table; anything unmatched is private.

use std::sync::LazyLock;

use regex::Regex;

/// Permission class of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// No authentication; cookies are ignored entirely.
    Public,
    /// Authentication optional; a present cookie is validated.
    Hybrid,
    /// Authentication required; a missing cookie is rejected.
    Private,
}

fn table(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static route pattern"))
        .collect()
}

static PUBLIC_ROUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    table(&[
        // login functions
        r"^/api/auth/login([^/]+)?$",
        r"^/api/user/forgotPasswordValidation$",
        r"^/api/user/resetForgotPassword$",
        r"^/api/verifyResetToken/[^/]+/[^/]+$",
        r"^/api/auth/referralUserInfo",
        // user creation
        r"^/api/user/createNewUser$",
        r"^/api/user/createNewGithubUser$",
        r"^/api/user/createNewGoogleUser$",
        r"^/api/user/validateUser$",
        r"^/api/email/verify$",
        // payment-processor webhooks
        r"^/api/stripe/webhook$",
        r"^/api/stripe/connected/webhook$",
        // internal routes carry their own agent authentication
        r"^/internal",
        // live checks
        r"^/ping$",
        r"^/healthz$",
        // static files
        r"^/static/ext/.*$",
        r"^/static/ui/.*$",
        r"^/sitemap/sitemap.xml$",
        // unsubscribe flows for logged-out users
        r"^/api/unsubscribe/check$",
        r"^/api/unsubscribe/modify$",
    ])
});

static HYBRID_ROUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    table(&[
        r"^/api/ws$",
        r"^/api/home/.*$",
        r"^/api/user/userProjects$",
        r"^/api/notification/get$",
        r"^/api/broadcast/get$",
        r"^/api/search/users$",
        r"^/api/search/posts$",
        r"^/static/user/pfp.*$",
        r"^/static/posts/t.*$",
        r"^/static/attempts/t.*$",
        r"^/api/project/attempts$",
        r"^/api/project/get$",
        r"^/api/project/closedAttempts$",
        r"^/api/discussion/getDiscussions$",
        r"^/api/user/profilePage$",
        r"^/api/user/getId$",
        r"^/api/project/getProjectCode$",
        r"^/api/discussion/getComments$",
        r"^/api/project/getProjectDirectories$",
        r"^/api/project/getProjectFiles$",
        r"^/api/discussion/getThreads$",
        r"^/api/discussion/getThreadReply$",
        r"^/api/attempt/get$",
        r"^/api/attempt/getProject$",
        r"^/api/search/tags$",
        r"^/api/chat/messages$",
        r"^/api/ephemeral/create$",
        r"^/api/project/verifyLink$",
        r"^/api/verifyRecaptcha$",
        r"^/api/recordUsage$",
    ])
});

/// Classify a URL path.
#[must_use]
pub fn classify(path: &str) -> RouteClass {
    if PUBLIC_ROUTES.iter().any(|route| route.is_match(path)) {
        return RouteClass::Public;
    }
    if HYBRID_ROUTES.iter().any(|route| route.is_match(path)) {
        return RouteClass::Hybrid;
    }
    RouteClass::Private
}
