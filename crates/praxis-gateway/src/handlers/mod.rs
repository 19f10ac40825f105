//! Request handlers owned by the gateway core.
//!
//! Business endpoints live elsewhere and are merged into the router by the
//! caller; only the liveness probes, the websocket upgrade, and the
//! agent-facing adapters belong here.

pub mod health;
pub mod internal;
pub mod ws;
