//! The websocket plugin contract.

use async_trait::async_trait;

use super::message::Message;

/// A participant in the master websocket.
///
/// Every inbound message is offered to every plugin in registration order;
/// plugins self-filter by message type and are cooperative, never exclusive.
/// Outbound traffic flows through the fan-in sender each plugin receives at
/// construction.
#[async_trait]
pub trait WebSocketPlugin: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Process one inbound message. Called concurrently from the
    /// connection's worker pool; messages outside the plugin's purview must
    /// be ignored.
    async fn handle_message(&self, message: &Message);

    /// Tear down sub-resources when the master connection closes.
    async fn close(&self);
}
