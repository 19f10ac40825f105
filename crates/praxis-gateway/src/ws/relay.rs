//! The agent relay plugin.
//!
//! Forwards exec/lint/LSP traffic from the client to the sandbox agent
//! serving the named byte attempt, and relays agent responses back. Agent
//! connections are dialed lazily over the overlay mesh, at most one per
//! byte attempt per connection. Two message types never touch the agent:
//! live pings extend the workspace lease and code updates persist the
//! editor delta, both straight against the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as AgentWsMessage;
use tokio_tungstenite::{client_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use praxis_core::{ByteAttemptId, UserId, WorkspaceId};
use praxis_mesh::{MeshStream, AGENT_SERVER_PORT};
use praxis_store::{CodeFile, Difficulty, WorkspaceState};

use super::agent::{format_for_agent, format_from_agent, AgentEnvelope, AgentRequest};
use super::message::{Message, MessageType, ResponseCode};
use super::plugin::WebSocketPlugin;
use super::socket::{send_until_cancelled, MasterSocket};
use crate::state::GatewayState;

/// The in-workspace URL agents accept relay connections on; the host part
/// is a placeholder because routing happens by mesh identity, not by name.
const AGENT_WS_URL: &str = "ws://dummy/api/v1/ws";

/// How far a live ping pushes the workspace lease out.
const LIVE_PING_EXTENSION_SECS: i64 = 10 * 60;

const SERVER_ERROR_MESSAGE: &str = "internal server error occurred";
const DIAL_FAILED_MESSAGE: &str =
    "We failed to establish a connection to your DevSpace. Please try to run the code again!";

type AgentWrite = SplitSink<WebSocketStream<MeshStream>, AgentWsMessage>;
type AgentRead = SplitStream<WebSocketStream<MeshStream>>;

#[derive(Clone)]
struct AgentConn {
    write: Arc<tokio::sync::Mutex<AgentWrite>>,
    workspace_id: WorkspaceId,
    last_message: Arc<RwLock<Instant>>,
}

/// Payload of a `ByteLivePing` frame.
#[derive(Debug, serde::Deserialize)]
struct ByteLivePingRequest {
    #[serde(default)]
    byte_attempt_id: Option<String>,
}

/// Payload of a `ByteUpdateCode` frame.
#[derive(Debug, serde::Deserialize)]
struct ByteUpdateCodeRequest {
    #[serde(default)]
    byte_attempt_id: Option<String>,
    #[serde(default)]
    files: Option<Vec<CodeFile>>,
    #[serde(default)]
    content_difficulty: Difficulty,
}

/// The relay plugin; one per master websocket connection.
pub struct AgentRelayPlugin {
    state: Arc<GatewayState>,
    socket: Arc<MasterSocket>,
    cancel: CancellationToken,
    conns: Arc<Mutex<HashMap<ByteAttemptId, AgentConn>>>,
    outgoing: mpsc::Sender<Message>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentRelayPlugin {
    /// Create the plugin for a connection.
    #[must_use]
    pub fn new(
        state: Arc<GatewayState>,
        socket: Arc<MasterSocket>,
        outgoing: mpsc::Sender<Message>,
    ) -> Self {
        let cancel = socket.cancellation().child_token();
        Self {
            state,
            socket,
            cancel,
            conns: Arc::new(Mutex::new(HashMap::new())),
            outgoing,
            tasks: Mutex::new(Vec::new()),
        }
    }

    const fn handles(message_type: MessageType) -> bool {
        matches!(
            message_type,
            MessageType::AgentExecRequest
                | MessageType::AgentLintRequest
                | MessageType::ByteUpdateCode
                | MessageType::ByteLivePing
                | MessageType::CancelExecRequest
                | MessageType::StdinExecRequest
                | MessageType::LaunchLspRequest
        )
    }

    async fn server_error(&self, sequence_id: &str, error: &str) {
        send_until_cancelled(
            &self.cancel,
            &self.outgoing,
            Message::generic_error(sequence_id, ResponseCode::ServerError, error),
        )
        .await;
    }

    async fn validation_failure(&self, sequence_id: &str, field: &str, tag: &str) {
        let mut errors = std::collections::BTreeMap::new();
        errors.insert(field.to_string(), tag.to_string());
        send_until_cancelled(
            &self.cancel,
            &self.outgoing,
            Message::validation_error(sequence_id, errors),
        )
        .await;
    }

    /// Resolve the byte attempt named in a side-channel payload to an ID,
    /// emitting the right error frame when it is missing or malformed.
    async fn parse_byte_attempt(
        &self,
        sequence_id: &str,
        raw: Option<&str>,
    ) -> Option<ByteAttemptId> {
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            self.validation_failure(sequence_id, "byte_attempt_id", "required")
                .await;
            return None;
        };
        match raw.parse::<ByteAttemptId>() {
            Ok(id) => Some(id),
            Err(_) => {
                self.validation_failure(sequence_id, "byte_attempt_id", "number")
                    .await;
                None
            }
        }
    }

    async fn current_user(&self, sequence_id: &str) -> Option<UserId> {
        match self.socket.user() {
            Some(user) => Some(user.id),
            None => {
                tracing::debug!("(agent-relay) cannot find a user in the websocket");
                self.server_error(sequence_id, "cannot find user in the websocket")
                    .await;
                None
            }
        }
    }

    async fn extend_workspace_expiration(&self, message: &Message) {
        let Ok(request) =
            serde_json::from_value::<ByteLivePingRequest>(message.payload.clone())
        else {
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
            return;
        };
        let Some(byte_attempt) = self
            .parse_byte_attempt(&message.sequence_id, request.byte_attempt_id.as_deref())
            .await
        else {
            return;
        };
        let Some(owner) = self.current_user(&message.sequence_id).await else {
            return;
        };

        let until = Utc::now() + chrono::Duration::seconds(LIVE_PING_EXTENSION_SECS);
        if let Err(e) = self
            .state
            .store
            .extend_workspace_expiration(byte_attempt, owner, until)
            .await
        {
            tracing::error!(error = %e, "(agent-relay) failed to update workspace expiration");
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
        }
    }

    async fn update_byte_attempt_code(&self, message: &Message) {
        let Ok(request) =
            serde_json::from_value::<ByteUpdateCodeRequest>(message.payload.clone())
        else {
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
            return;
        };
        let Some(byte_attempt) = self
            .parse_byte_attempt(&message.sequence_id, request.byte_attempt_id.as_deref())
            .await
        else {
            return;
        };
        let Some(files) = request.files else {
            self.validation_failure(&message.sequence_id, "files", "required")
                .await;
            return;
        };
        let Some(owner) = self.current_user(&message.sequence_id).await else {
            return;
        };

        if let Err(e) = self
            .state
            .store
            .update_byte_attempt_code(byte_attempt, owner, request.content_difficulty, files)
            .await
        {
            tracing::error!(error = %e, "(agent-relay) failed to update byte attempt code");
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
        }
    }

    async fn relay_to_agent(&self, message: &Message) {
        let Ok(request) = serde_json::from_value::<AgentRequest>(message.payload.clone()) else {
            tracing::error!("(agent-relay) failed to decode agent request payload");
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
            return;
        };

        let Some(code_source) = request.code_source() else {
            self.validation_failure(&message.sequence_id, "code_source_id", "missing")
                .await;
            return;
        };
        let Ok(byte_attempt) = code_source.parse::<ByteAttemptId>() else {
            self.validation_failure(&message.sequence_id, "code_source_id", "not a number")
                .await;
            return;
        };
        let Some(owner) = self.current_user(&message.sequence_id).await else {
            return;
        };

        let Some(conn) = self.ensure_conn(message, byte_attempt, owner).await else {
            return;
        };

        let envelope = match format_for_agent(
            message,
            request.payload,
            Utc::now().timestamp(),
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "(agent-relay) failed to format payload for agent");
                self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                    .await;
                return;
            }
        };

        let Ok(text) = serde_json::to_string(&envelope) else {
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
            return;
        };

        tracing::debug!(byte_attempt = %byte_attempt, "(agent-relay) forwarding message to agent");
        let write_result = conn.write.lock().await.send(AgentWsMessage::Text(text)).await;
        if let Err(e) = write_result {
            tracing::error!(error = %e, "(agent-relay) failed to write message to agent");
            self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                .await;
        }
    }

    /// Fetch the live connection for a byte attempt, dialing it on first
    /// use. Errors are reported over the outgoing channel; `None` means an
    /// error frame was already sent or logged.
    async fn ensure_conn(
        &self,
        message: &Message,
        byte_attempt: ByteAttemptId,
        owner: UserId,
    ) -> Option<AgentConn> {
        if let Some(conn) = self.conns.lock().get(&byte_attempt) {
            return Some(conn.clone());
        }

        tracing::debug!(byte_attempt = %byte_attempt, "(agent-relay) dialing agent websocket");

        let credentials = match self
            .state
            .store
            .agent_for_byte_attempt(byte_attempt, owner)
            .await
        {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                tracing::info!(byte_attempt = %byte_attempt, "(agent-relay) no active agents found");
                self.server_error(
                    &message.sequence_id,
                    "cannot find workspace or workspace agent",
                )
                .await;
                return None;
            }
            Err(e) => {
                tracing::error!(byte_attempt = %byte_attempt, error = %e, "(agent-relay) failed to query workspace agent");
                return None;
            }
        };

        if credentials.workspace_state != WorkspaceState::Active {
            tracing::debug!(byte_attempt = %byte_attempt, "(agent-relay) workspace is not active");
            self.server_error(&message.sequence_id, "workspace is not active")
                .await;
            return None;
        }

        let stream = match self
            .state
            .mesh
            .dial_agent(credentials.agent_id, AGENT_SERVER_PORT)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "(agent-relay) failed to dial byte agent");
                self.request_teardown(credentials.workspace_id, owner).await;
                self.server_error(&message.sequence_id, DIAL_FAILED_MESSAGE)
                    .await;
                return None;
            }
        };

        let request = match AGENT_WS_URL.into_client_request() {
            Ok(mut request) => {
                match format!("Bearer {}", credentials.secret).parse() {
                    Ok(value) => {
                        request
                            .headers_mut()
                            .insert(axum::http::header::AUTHORIZATION, value);
                        request
                    }
                    Err(_) => {
                        self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                            .await;
                        return None;
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "(agent-relay) failed to build agent handshake");
                self.server_error(&message.sequence_id, SERVER_ERROR_MESSAGE)
                    .await;
                return None;
            }
        };

        let agent_socket = match client_async(request, stream).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                tracing::error!(error = %e, "(agent-relay) agent handshake failed");
                self.request_teardown(credentials.workspace_id, owner).await;
                self.server_error(&message.sequence_id, DIAL_FAILED_MESSAGE)
                    .await;
                return None;
            }
        };

        let (write, read) = agent_socket.split();
        let conn = AgentConn {
            write: Arc::new(tokio::sync::Mutex::new(write)),
            workspace_id: credentials.workspace_id,
            last_message: Arc::new(RwLock::new(Instant::now())),
        };

        let handle = tokio::spawn(relay_reader(
            self.cancel.clone(),
            self.conns.clone(),
            self.outgoing.clone(),
            byte_attempt,
            read,
            conn.last_message.clone(),
        ));
        self.tasks.lock().push(handle);
        self.conns.lock().insert(byte_attempt, conn.clone());

        Some(conn)
    }

    async fn request_teardown(&self, workspace: WorkspaceId, owner: UserId) {
        if let Err(e) = self.state.store.request_teardown(workspace, owner).await {
            tracing::error!(workspace = %workspace, error = %e, "(agent-relay) failed to request workspace teardown");
        }
    }
}

#[async_trait]
impl WebSocketPlugin for AgentRelayPlugin {
    fn name(&self) -> &'static str {
        "agentRelay"
    }

    async fn handle_message(&self, message: &Message) {
        if !Self::handles(message.message_type) {
            return;
        }

        tracing::debug!(
            sequence_id = %message.sequence_id,
            message_type = ?message.message_type,
            "(agent-relay) received request",
        );

        match message.message_type {
            MessageType::ByteLivePing => self.extend_workspace_expiration(message).await,
            MessageType::ByteUpdateCode => self.update_byte_attempt_code(message).await,
            _ => self.relay_to_agent(message).await,
        }
    }

    async fn close(&self) {
        self.cancel.cancel();

        let conns: Vec<AgentConn> = self.conns.lock().drain().map(|(_, conn)| conn).collect();
        for conn in conns {
            tracing::debug!(
                workspace = %conn.workspace_id,
                idle = ?conn.last_message.read().elapsed(),
                "(agent-relay) closing agent connection",
            );
            let mut write = conn.write.lock().await;
            let _ = write
                .send(AgentWsMessage::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "backend shutdown".into(),
                })))
                .await;
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Read agent frames and push their gateway translations to the outgoing
/// channel. Exits — and drops the mapping — on any read error or close.
async fn relay_reader(
    cancel: CancellationToken,
    conns: Arc<Mutex<HashMap<ByteAttemptId, AgentConn>>>,
    outgoing: mpsc::Sender<Message>,
    byte_attempt: ByteAttemptId,
    mut read: AgentRead,
    last_message: Arc<RwLock<Instant>>,
) {
    tracing::debug!(byte_attempt = %byte_attempt, "(agent-relay) reader started");

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = read.next() => frame,
        };

        let Some(Ok(frame)) = frame else { break };
        let text = match frame {
            AgentWsMessage::Text(text) => text,
            AgentWsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => break,
            },
            AgentWsMessage::Ping(_) | AgentWsMessage::Pong(_) | AgentWsMessage::Frame(_) => {
                continue;
            }
            AgentWsMessage::Close(_) => break,
        };

        let Ok(envelope) = serde_json::from_str::<AgentEnvelope>(&text) else {
            break;
        };
        *last_message.write() = Instant::now();

        let sequence_id = envelope.sequence_id.clone();
        match format_from_agent(envelope) {
            Ok(Some(message)) => {
                // Server-initiated agent frames with no sequence ID carry
                // nothing the client can correlate; drop them.
                if message.sequence_id.is_empty() {
                    continue;
                }
                if !send_until_cancelled(&cancel, &outgoing, message).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "(agent-relay) failed to format payload from agent");
                send_until_cancelled(
                    &cancel,
                    &outgoing,
                    Message::generic_error(
                        &sequence_id,
                        ResponseCode::ServerError,
                        SERVER_ERROR_MESSAGE,
                    ),
                )
                .await;
            }
        }
    }

    conns.lock().remove(&byte_attempt);
    tracing::debug!(byte_attempt = %byte_attempt, "(agent-relay) reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purview_is_exact() {
        assert!(AgentRelayPlugin::handles(MessageType::AgentExecRequest));
        assert!(AgentRelayPlugin::handles(MessageType::ByteLivePing));
        assert!(AgentRelayPlugin::handles(MessageType::LaunchLspRequest));
        assert!(!AgentRelayPlugin::handles(MessageType::GenericError));
        assert!(!AgentRelayPlugin::handles(MessageType::AgentExecResponse));
        assert!(!AgentRelayPlugin::handles(MessageType::ValidationError));
    }
}
