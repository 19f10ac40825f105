//! Gateway application state.
//!
//! One `GatewayState` is shared by every request handler and middleware
//! layer. Collaborators are held as trait objects so the binary, the tests,
//! and production deployments can wire different backends.

use std::sync::Arc;

use regex::Regex;

use praxis_auth::TokenValidator;
use praxis_core::SnowflakeGenerator;
use praxis_mesh::MeshDialer;
use praxis_store::{PlatformStore, VolatileStore};

use crate::config::GatewayConfig;
use crate::pool::BufferPool;

/// Shared application state for the gateway.
pub struct GatewayState {
    /// The relational store.
    pub store: Arc<dyn PlatformStore>,
    /// The shared TTL'd blob store backing the cache and rate limiter.
    pub volatile: Arc<dyn VolatileStore>,
    /// Session token validator.
    pub validator: Arc<dyn TokenValidator>,
    /// Overlay-mesh dialer for reaching sandbox agents.
    pub mesh: Arc<dyn MeshDialer>,
    /// Request ID generator.
    pub snowflake: SnowflakeGenerator,
    /// Body-capture buffer pool.
    pub buffers: BufferPool,
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Compiled origin allow-list.
    origin_matchers: Vec<Regex>,
}

impl GatewayState {
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        store: Arc<dyn PlatformStore>,
        volatile: Arc<dyn VolatileStore>,
        validator: Arc<dyn TokenValidator>,
        mesh: Arc<dyn MeshDialer>,
        config: GatewayConfig,
    ) -> Self {
        let snowflake = SnowflakeGenerator::new(config.node_id);
        let origin_matchers = config
            .allowed_origins()
            .iter()
            .filter_map(|origin| Regex::new(&glob_pattern(origin)).ok())
            .collect();
        Self {
            store,
            volatile,
            validator,
            mesh,
            snowflake,
            buffers: BufferPool::new(),
            config,
            origin_matchers,
        }
    }

    /// Whether `origin` matches the allow-list. Entries use `*` as a
    /// wildcard over any run of characters.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.origin_matchers.iter().any(|m| m.is_match(origin))
    }

    /// Snapshot of the compiled origin patterns, for the CORS predicate.
    #[must_use]
    pub fn origin_matchers(&self) -> Vec<Regex> {
        self.origin_matchers.clone()
    }
}

/// Convert an origin glob into an anchored regex.
fn glob_pattern(origin: &str) -> String {
    format!("^{}$", regex::escape(origin).replace("\\*", ".*"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_auth::MockValidator;
    use praxis_mesh::LoopbackMesh;
    use praxis_store::{MemoryStore, MemoryVolatile};

    fn state() -> GatewayState {
        GatewayState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryVolatile::new()),
            Arc::new(MockValidator::new()),
            Arc::new(LoopbackMesh::new()),
            GatewayConfig::default(),
        )
    }

    #[test]
    fn subdomain_wildcard_matches() {
        let state = state();
        assert!(state.origin_allowed("https://www.gigo.dev"));
        assert!(state.origin_allowed("https://gigo.dev"));
        assert!(!state.origin_allowed("https://evil.example.com"));
        assert!(!state.origin_allowed("https://gigo.dev.evil.example.com"));
    }
}
