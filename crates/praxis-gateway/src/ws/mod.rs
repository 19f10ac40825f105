//! The master websocket fabric.
//!
//! One long-lived connection per client multiplexes every realtime concern.
//! Inbound frames fan out to an ordered set of plugins (each self-filters by
//! message type) and to a handler registry; outbound traffic from plugins
//! fans back in over one channel. The agent relay plugin proxies a subset of
//! messages to per-user sandbox agents dialed over the overlay mesh.

pub mod agent;
pub mod message;
pub mod plugin;
pub mod relay;
pub mod socket;

pub use message::{GenericErrorPayload, Message, MessageType, ResponseCode, ValidationErrorPayload};
pub use plugin::WebSocketPlugin;
pub use socket::{run_master_socket, HandlerRegistry, MasterSocket, WebSocketHandler};
