//! The middleware pipeline.
//!
//! Layers compose in a strict order (outermost first): panic recovery, CORS,
//! rate limiting, CDN admission, session authentication, request
//! initialization, response caching. The ordering is load-bearing: rate
//! limiting precedes the authenticator's database lookups, authentication
//! precedes body buffering so rejected requests never consume buffers, and
//! buffering precedes the cache so keys can be derived from body fields.

pub mod agent;
pub mod cache;
pub mod cdn;
pub mod init;
pub mod rate_limit;
pub mod session;
