//! Overlay-mesh dial abstraction.
//!
//! The gateway holds no network route to sandbox agents. Reaching one is a
//! request to the zero-trust overlay for a virtual TCP circuit keyed by
//! agent identity — never DNS plus TCP. This crate defines that capability
//! as the [`MeshDialer`] trait returning an opaque byte stream, and provides
//! [`LoopbackMesh`], a development implementation that resolves agents to
//! local TCP addresses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use praxis_core::AgentId;

/// The port every sandbox agent listens on inside its workspace.
pub const AGENT_SERVER_PORT: u16 = 13_337;

/// An opaque bidirectional byte stream over the mesh.
pub type MeshStream = Pin<Box<dyn MeshIo + Send>>;

/// Marker trait for streams usable as mesh circuits.
pub trait MeshIo: AsyncRead + AsyncWrite + Unpin {}

impl<T> MeshIo for T where T: AsyncRead + AsyncWrite + Unpin {}

/// A result type using `MeshError`.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors from dialing through the mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The agent has no circuit endpoint registered on the mesh.
    #[error("agent not registered: {0}")]
    UnknownAgent(AgentId),

    /// The circuit could not be established.
    #[error("dial failed: {0}")]
    DialFailed(String),
}

/// Trait for establishing a circuit to an agent.
#[async_trait]
pub trait MeshDialer: Send + Sync {
    /// Open a TCP circuit to `agent` on `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unknown to the mesh or the circuit
    /// cannot be established.
    async fn dial_agent(&self, agent: AgentId, port: u16) -> Result<MeshStream>;
}

/// Development mesh that resolves agents to local TCP addresses.
///
/// Tests register an agent against a listener they control and the dialer
/// connects directly. The `port` argument is ignored; the registered
/// address wins, mirroring how the real overlay terminates the circuit
/// wherever the agent actually listens.
#[derive(Default)]
pub struct LoopbackMesh {
    routes: RwLock<HashMap<AgentId, SocketAddr>>,
}

impl LoopbackMesh {
    /// Create an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the address an agent is reachable at.
    pub fn register(&self, agent: AgentId, addr: SocketAddr) {
        self.routes.write().insert(agent, addr);
    }

    /// Remove an agent's route.
    pub fn unregister(&self, agent: AgentId) {
        self.routes.write().remove(&agent);
    }
}

#[async_trait]
impl MeshDialer for LoopbackMesh {
    async fn dial_agent(&self, agent: AgentId, _port: u16) -> Result<MeshStream> {
        let addr = self
            .routes
            .read()
            .get(&agent)
            .copied()
            .ok_or(MeshError::UnknownAgent(agent))?;

        tracing::debug!(agent = %agent, addr = %addr, "dialing agent over loopback mesh");
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| MeshError::DialFailed(e.to_string()))?;
        Ok(Box::pin(stream))
    }
}
