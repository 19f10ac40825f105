//! Session cookie construction and revocation.
//!
//! Cookie attributes differ by environment: production uses
//! `SameSite=Strict; Secure`, development relaxes to `SameSite=Lax` without
//! `Secure` so local frontends can authenticate over plain HTTP.

use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::{Cookie, Expiration, SameSite};

/// Name of the authenticated session cookie.
pub const AUTH_COOKIE: &str = "gigoAuthToken";

/// Name of the ephemeral session cookie.
pub const EPHEMERAL_COOKIE: &str = "gigoTempToken";

/// Build a session cookie holding `token`, valid for `max_age_secs`.
#[must_use]
pub fn session_cookie(
    name: &'static str,
    token: String,
    domain: &str,
    max_age_secs: i64,
    development: bool,
) -> Cookie<'static> {
    let mut cookie = base_cookie(name, token, domain, development);
    cookie.set_max_age(CookieDuration::seconds(max_age_secs));
    cookie
}

/// Build the revocation form of the auth cookie: same attributes, empty
/// value, expired at the epoch.
#[must_use]
pub fn revocation_cookie(domain: &str, development: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(AUTH_COOKIE, String::new(), domain, development);
    cookie.set_expires(Expiration::DateTime(OffsetDateTime::UNIX_EPOCH));
    cookie
}

fn base_cookie(
    name: &'static str,
    value: String,
    domain: &str,
    development: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_domain(format!(".{domain}"));
    if development {
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(false);
    } else {
        cookie.set_same_site(SameSite::Strict);
        cookie.set_secure(true);
    }
    cookie
}
