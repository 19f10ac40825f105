//! The volatile TTL'd blob store.
//!
//! This is the gateway's view of the shared Redis cluster: opaque values
//! under string keys with per-key expiry, plus the counter primitive the
//! rate limiter is built on. Writes are last-writer-wins across the fleet.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A keyed blob store with TTLs.
#[async_trait]
pub trait VolatileStore: Send + Sync {
    /// Fetch a value. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with a TTL, replacing any existing value.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, returning the count removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64>;

    /// Reset the TTL of an existing key. Returns `false` if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Increment a counter, creating it with `ttl` on first use, and return
    /// the post-increment value. The TTL is not refreshed on subsequent
    /// increments, which makes this a fixed-window counter.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64>;
}
