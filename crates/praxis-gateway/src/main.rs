//! Praxis Gateway - HTTP/WebSocket gateway binary.
//!
//! This is the main entry point for the gateway service. Configuration is
//! environment-driven; the binary wires the in-memory reference backends,
//! which are suitable for development. Production deployments construct the
//! state with real store, volatile-store, and mesh implementations.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use praxis_auth::Hs256Validator;
use praxis_gateway::{create_router, GatewayConfig, GatewayState};
use praxis_mesh::LoopbackMesh;
use praxis_store::{MemoryStore, MemoryVolatile};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,praxis=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Praxis Gateway");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let domain = std::env::var("DOMAIN").unwrap_or_else(|_| "gigo.dev".into());
    let development_mode = env_flag("DEVELOPMENT_MODE");
    let force_cdn = env_flag("FORCE_CDN");
    let cdn_secret = std::env::var("CDN_SECRET").unwrap_or_default();
    let cdn_whitelist: Vec<praxis_gateway::config::IpNetwork> = std::env::var("CDN_WHITELIST")
        .unwrap_or_default()
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.trim().parse() {
            Ok(network) => Some(network),
            Err(e) => {
                tracing::warn!(entry, error = %e, "skipping unparsable CDN whitelist entry");
                None
            }
        })
        .collect();
    let node_id = std::env::var("NODE_ID")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);

    let token_secret = std::env::var("TOKEN_SECRET").unwrap_or_else(|_| {
        tracing::warn!("TOKEN_SECRET not set - using the development secret");
        "praxis-dev-secret".into()
    });

    let config = GatewayConfig {
        listen_addr: listen_addr.clone(),
        domain,
        development_mode,
        force_cdn,
        cdn_secret,
        cdn_whitelist,
        node_id,
        ..GatewayConfig::default()
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        domain = %config.domain,
        development_mode = config.development_mode,
        force_cdn = config.force_cdn,
        node_id = config.node_id,
        "Gateway configuration loaded"
    );

    // In-memory reference backends; production wires SQL, Redis, and the
    // real overlay mesh here.
    let store = Arc::new(MemoryStore::new());
    let volatile = Arc::new(MemoryVolatile::new());
    let validator = Arc::new(Hs256Validator::new(token_secret.as_bytes()));
    let mesh = Arc::new(LoopbackMesh::new());

    let state = Arc::new(GatewayState::new(store, volatile, validator, mesh, config));
    let app = create_router(state);
    tracing::info!("Router configured");

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}
