//! Declarative response-cache descriptors and key derivation.
//!
//! Caching is data, not code: each cacheable endpoint is one
//! [`CacheDescriptor`] row in a static table. Adding a cached endpoint or an
//! invalidation relationship means adding a row, never touching the cache
//! layer or a handler.

use std::sync::LazyLock;
use std::time::Duration;

use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use praxis_core::UserId;

/// Key namespace shared by every cached response.
const KEY_NAMESPACE: &str = "httpcache";

/// Length of each digest prefix contributing to a body fingerprint.
const DIGEST_PREFIX_LEN: usize = 8;

/// One cacheable endpoint.
#[derive(Debug)]
pub struct CacheDescriptor {
    /// Pattern the request path must match.
    pub path_pattern: Regex,
    /// Canonical path used for key derivation on the invalidation side,
    /// where no concrete request for this endpoint exists.
    pub key_path: &'static str,
    /// HTTP method constraint; `None` matches any method.
    pub method: Option<Method>,
    /// How long a cached response lives.
    pub ttl: Duration,
    /// JSON body fields contributing to the key fingerprint, in order.
    pub key_fields: &'static [&'static str],
    /// Whether the authenticated user participates in the key.
    pub user_scoped: bool,
    /// Whether a hit extends the TTL.
    pub refresh_on_hit: bool,
    /// Successful responses from paths matching this pattern evict the
    /// entry this descriptor produced.
    pub invalidate_on: Option<Regex>,
}

impl CacheDescriptor {
    /// Whether this descriptor applies to a request.
    #[must_use]
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        if !self.path_pattern.is_match(path) {
            return false;
        }
        self.method.as_ref().is_none_or(|m| m == method)
    }

    /// Derive the full cache key for a concrete request.
    ///
    /// # Errors
    ///
    /// Returns an error when the descriptor names key fields and the body is
    /// missing, unparsable, or lacks one of the fields.
    pub fn derive_key(
        &self,
        path: &str,
        method: &Method,
        user: Option<UserId>,
        body: Option<&[u8]>,
    ) -> Result<String, KeyError> {
        let mut key = self.base_key(path, method, user);
        if !self.key_fields.is_empty() {
            let body = body.ok_or(KeyError::MissingBody)?;
            key.push(':');
            key.push_str(&fingerprint(self.key_fields, body)?);
        }
        Ok(key)
    }

    /// Derive the invalidation key: the same derivation minus the body
    /// fingerprint, anchored at the canonical path. Entries differentiated
    /// by body fields share this as a prefix.
    #[must_use]
    pub fn invalidation_key(&self, user: Option<UserId>) -> String {
        let method = self.method.clone().unwrap_or(Method::POST);
        self.base_key(self.key_path, &method, user)
    }

    fn base_key(&self, path: &str, method: &Method, user: Option<UserId>) -> String {
        let mut key = format!("{KEY_NAMESPACE}:{path}:{method}");
        if self.user_scoped {
            // Anonymous callers share one slot, keyed as user -1.
            let user = user.map_or(-1, |id| id.as_i64());
            key.push_str(&format!(":{user}"));
        }
        key
    }
}

/// Errors from cache-key derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The descriptor names key fields but no body buffer was attached.
    #[error("missing request body buffer")]
    MissingBody,

    /// The body was not valid JSON.
    #[error("request body is not valid json")]
    MalformedBody,

    /// A named key field was absent from the body.
    #[error("missing key field {0:?}")]
    MissingField(&'static str),
}

/// Fingerprint the named fields of a JSON body.
///
/// Each field's raw JSON value is digested and truncated to 8 hex chars; the
/// concatenation is digested again and truncated to 8. The result is stable
/// and order-preserving, and does not depend on key traversal order in the
/// original body.
fn fingerprint(fields: &[&'static str], body: &[u8]) -> Result<String, KeyError> {
    let parsed: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| KeyError::MalformedBody)?;

    let mut joined = String::with_capacity(fields.len() * DIGEST_PREFIX_LEN);
    for field in fields {
        let value = parsed.get(field).ok_or(KeyError::MissingField(field))?;
        let digest = blake3::hash(value.to_string().as_bytes());
        joined.push_str(&digest.to_hex()[..DIGEST_PREFIX_LEN]);
    }

    let digest = blake3::hash(joined.as_bytes());
    Ok(digest.to_hex()[..DIGEST_PREFIX_LEN].to_string())
}

/// A cached response as stored in the volatile store.
///
/// Field names are part of the wire format shared with the rest of the
/// fleet; do not rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The JSON response body.
    #[serde(rename = "Body")]
    pub body: Option<serde_json::Value>,
    /// The status code the body was served with.
    #[serde(rename = "Status", default)]
    pub status: u16,
}

impl CachedResponse {
    /// Whether the stored tuple is usable. Malformed entries are deleted
    /// and treated as misses.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.body.is_some() && self.status != 0
    }
}

const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const SEVEN_DAYS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The cacheable-endpoint table.
pub static CACHE_ENDPOINTS: LazyLock<Vec<CacheDescriptor>> = LazyLock::new(|| {
    vec![
        CacheDescriptor {
            path_pattern: Regex::new("^/api/project/get$").expect("static pattern"),
            key_path: "/api/project/get",
            method: Some(Method::POST),
            ttl: FIVE_MINUTES,
            key_fields: &["post_id"],
            user_scoped: true,
            refresh_on_hit: false,
            invalidate_on: Some(Regex::new("^/api/project/editProject$").expect("static pattern")),
        },
        CacheDescriptor {
            path_pattern: Regex::new("^/api/project/attempts$").expect("static pattern"),
            key_path: "/api/project/attempts",
            method: Some(Method::POST),
            ttl: FIVE_MINUTES,
            key_fields: &["project_id", "skip", "limit"],
            user_scoped: true,
            refresh_on_hit: false,
            invalidate_on: Some(Regex::new("^/api/project/editAttempt$").expect("static pattern")),
        },
        CacheDescriptor {
            path_pattern: Regex::new("^/api/project/closedAttempts$").expect("static pattern"),
            key_path: "/api/project/closedAttempts",
            method: Some(Method::POST),
            ttl: FIVE_MINUTES,
            key_fields: &["project_id", "skip", "limit"],
            user_scoped: true,
            refresh_on_hit: false,
            invalidate_on: None,
        },
        CacheDescriptor {
            path_pattern: Regex::new("^/api/broadcast/get$").expect("static pattern"),
            key_path: "/api/broadcast/get",
            method: Some(Method::POST),
            ttl: FIVE_MINUTES,
            key_fields: &[],
            user_scoped: true,
            refresh_on_hit: false,
            invalidate_on: None,
        },
        CacheDescriptor {
            path_pattern: Regex::new("^/api/attempt/getProject$").expect("static pattern"),
            key_path: "/api/attempt/getProject",
            method: Some(Method::POST),
            ttl: FIVE_MINUTES,
            key_fields: &["attempt_id"],
            user_scoped: true,
            refresh_on_hit: false,
            invalidate_on: None,
        },
        CacheDescriptor {
            path_pattern: Regex::new("^/api/user/getId$").expect("static pattern"),
            key_path: "/api/user/getId",
            method: Some(Method::POST),
            ttl: SEVEN_DAYS,
            key_fields: &["username"],
            user_scoped: false,
            refresh_on_hit: true,
            invalidate_on: None,
        },
    ]
});

/// Find the first descriptor applying to a request, in declaration order.
#[must_use]
pub fn match_descriptor(path: &str, method: &Method) -> Option<&'static CacheDescriptor> {
    CACHE_ENDPOINTS.iter().find(|d| d.matches(path, method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_get() -> &'static CacheDescriptor {
        match_descriptor("/api/project/get", &Method::POST).unwrap()
    }

    #[test]
    fn first_matching_descriptor_wins() {
        assert!(match_descriptor("/api/project/get", &Method::POST).is_some());
        assert!(match_descriptor("/api/project/get", &Method::GET).is_none());
        assert!(match_descriptor("/api/project/editProject", &Method::POST).is_none());
    }

    #[test]
    fn key_shape_with_fingerprint() {
        let key = project_get()
            .derive_key(
                "/api/project/get",
                &Method::POST,
                Some(UserId::from_raw(42)),
                Some(br#"{"post_id":"69"}"#),
            )
            .unwrap();
        assert!(key.starts_with("httpcache:/api/project/get:POST:42:"));
        assert_eq!(key.len(), "httpcache:/api/project/get:POST:42:".len() + 8);
    }

    #[test]
    fn fingerprint_is_stable_across_field_order() {
        let descriptor = match_descriptor("/api/project/attempts", &Method::POST).unwrap();
        let a = descriptor
            .derive_key(
                "/api/project/attempts",
                &Method::POST,
                Some(UserId::from_raw(1)),
                Some(br#"{"project_id":"9","skip":0,"limit":10}"#),
            )
            .unwrap();
        let b = descriptor
            .derive_key(
                "/api/project/attempts",
                &Method::POST,
                Some(UserId::from_raw(1)),
                Some(br#"{"limit":10,"project_id":"9","skip":0}"#),
            )
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_value() {
        let a = project_get()
            .derive_key(
                "/api/project/get",
                &Method::POST,
                Some(UserId::from_raw(1)),
                Some(br#"{"post_id":"69"}"#),
            )
            .unwrap();
        let b = project_get()
            .derive_key(
                "/api/project/get",
                &Method::POST,
                Some(UserId::from_raw(1)),
                Some(br#"{"post_id":"70"}"#),
            )
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn anonymous_user_keys_as_minus_one() {
        let descriptor = match_descriptor("/api/broadcast/get", &Method::POST).unwrap();
        let key = descriptor
            .derive_key("/api/broadcast/get", &Method::POST, None, None)
            .unwrap();
        assert_eq!(key, "httpcache:/api/broadcast/get:POST:-1");
    }

    #[test]
    fn missing_key_field_is_an_error() {
        let err = project_get()
            .derive_key(
                "/api/project/get",
                &Method::POST,
                Some(UserId::from_raw(1)),
                Some(br#"{"other":"x"}"#),
            )
            .unwrap_err();
        assert_eq!(err, KeyError::MissingField("post_id"));
    }

    #[test]
    fn invalidation_key_is_a_prefix_of_the_full_key() {
        let descriptor = project_get();
        let full = descriptor
            .derive_key(
                "/api/project/get",
                &Method::POST,
                Some(UserId::from_raw(42)),
                Some(br#"{"post_id":"69"}"#),
            )
            .unwrap();
        let prefix = descriptor.invalidation_key(Some(UserId::from_raw(42)));
        assert_eq!(prefix, "httpcache:/api/project/get:POST:42");
        assert!(full.starts_with(&format!("{prefix}:")));
    }

    #[test]
    fn malformed_cached_response_detected() {
        let parsed: CachedResponse = serde_json::from_str(r#"{"Body":null,"Status":200}"#).unwrap();
        assert!(!parsed.is_valid());
        let parsed: CachedResponse =
            serde_json::from_str(r#"{"Body":{"ok":true},"Status":0}"#).unwrap();
        assert!(!parsed.is_valid());
        let parsed: CachedResponse =
            serde_json::from_str(r#"{"Body":{"ok":true},"Status":200}"#).unwrap();
        assert!(parsed.is_valid());
    }
}
