//! HTTP and WebSocket gateway for the praxis learning platform.
//!
//! This crate is the request gateway and session fabric: every endpoint of
//! the platform — REST, the master websocket, and agent-side callbacks —
//! enters through one listener and one middleware pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │              (browsers / mobile / CDN edges)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       praxis-gateway                        │
//! │  panic → cors → rate limit → cdn → session → init → cache   │
//! │  ┌─────────────┐ ┌──────────────┐ ┌─────────────────────┐   │
//! │  │   Router    │ │    Master    │ │    Agent Relay      │   │
//! │  │ + Handlers  │ │  WebSocket   │ │  (mesh-dialed)      │   │
//! │  └─────────────┘ └──────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!               │              │              │
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │Relational│   │ Volatile │   │ Overlay  │
//!        │  Store   │   │  Store   │   │   Mesh   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use praxis_auth::Hs256Validator;
//! use praxis_gateway::{create_router, GatewayConfig, GatewayState};
//! use praxis_mesh::LoopbackMesh;
//! use praxis_store::{MemoryStore, MemoryVolatile};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = GatewayState::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryVolatile::new()),
//!     Arc::new(Hs256Validator::new(b"secret")),
//!     Arc::new(LoopbackMesh::new()),
//!     GatewayConfig::default(),
//! );
//!
//! let app = create_router(Arc::new(state));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod classify;
pub mod config;
pub mod context;
pub mod handlers;
pub mod middleware;
pub mod pool;
pub mod respond;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::GatewayConfig;
pub use routes::{create_router, create_router_with_routes};
pub use state::GatewayState;

// Re-export key types for convenience
pub use classify::{classify, RouteClass};
pub use context::{AgentIdentity, AuthSession};
