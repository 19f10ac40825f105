//! The agent-side websocket envelope and its translation.
//!
//! Sandbox agents speak their own enum and a richer envelope carrying an
//! origin and a timestamp. The relay translates in both directions and
//! never leaks one enum onto the other side of the wire.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

use super::message::{Message, MessageType};

/// Type codes on the agent side of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum AgentMessageType {
    /// Connection bootstrap frame; dropped by the relay.
    Init = 0,
    /// Validation failure inside the agent.
    ValidationError = 1,
    /// Generic failure inside the agent.
    GenericError = 2,
    /// Execute the working set.
    ExecRequest = 3,
    /// Execution output.
    ExecResponse = 4,
    /// Lint the working set.
    LintRequest = 5,
    /// Lint results.
    LintResponse = 6,
    /// Cancel a running command.
    CancelExecRequest = 7,
    /// Cancellation acknowledgement.
    CancelExecResponse = 8,
    /// Stdin for a running command.
    StdinExecRequest = 9,
    /// Stdin acknowledgement.
    StdinExecResponse = 10,
    /// Launch a language server.
    LaunchLspRequest = 11,
    /// Language-server launch acknowledgement.
    LaunchLspResponse = 12,
}

/// Who originated an agent-side frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum AgentOrigin {
    /// The gateway or the agent itself.
    Server = 0,
    /// A relayed client message.
    Client = 1,
}

/// A frame on an agent connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEnvelope {
    /// Correlation ID, preserved across the relay.
    pub sequence_id: String,
    /// Agent-side type code.
    #[serde(rename = "type")]
    pub message_type: AgentMessageType,
    /// Frame origin.
    pub origin: AgentOrigin,
    /// Unix timestamp the frame was produced at.
    pub created_at: i64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// A message type with no counterpart on the other side.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported message type: {0}")]
pub struct UnsupportedType(pub i32);

/// Re-encode a client message for the agent.
///
/// # Errors
///
/// Returns an error for types the agent does not accept.
pub fn format_for_agent(
    message: &Message,
    inner: serde_json::Value,
    created_at: i64,
) -> Result<AgentEnvelope, UnsupportedType> {
    let message_type = match message.message_type {
        MessageType::AgentExecRequest => AgentMessageType::ExecRequest,
        MessageType::AgentExecResponse => AgentMessageType::ExecResponse,
        MessageType::AgentLintRequest => AgentMessageType::LintRequest,
        MessageType::AgentLintResponse => AgentMessageType::LintResponse,
        MessageType::CancelExecRequest => AgentMessageType::CancelExecRequest,
        MessageType::CancelExecResponse => AgentMessageType::CancelExecResponse,
        MessageType::StdinExecRequest => AgentMessageType::StdinExecRequest,
        MessageType::StdinExecResponse => AgentMessageType::StdinExecResponse,
        MessageType::LaunchLspRequest => AgentMessageType::LaunchLspRequest,
        other => return Err(UnsupportedType(other as i32)),
    };

    Ok(AgentEnvelope {
        sequence_id: message.sequence_id.clone(),
        message_type,
        origin: AgentOrigin::Client,
        created_at,
        payload: inner,
    })
}

/// Translate an agent frame back into a gateway frame.
///
/// `Ok(None)` means the frame is internal to the agent protocol (`Init`)
/// and must be dropped silently.
///
/// # Errors
///
/// Returns an error for agent types with no client-facing counterpart.
pub fn format_from_agent(envelope: AgentEnvelope) -> Result<Option<Message>, UnsupportedType> {
    let message_type = match envelope.message_type {
        AgentMessageType::ExecResponse => MessageType::AgentExecResponse,
        AgentMessageType::LintResponse => MessageType::AgentLintResponse,
        AgentMessageType::ValidationError => MessageType::ValidationError,
        AgentMessageType::GenericError => MessageType::GenericError,
        AgentMessageType::CancelExecRequest => MessageType::CancelExecRequest,
        AgentMessageType::CancelExecResponse => MessageType::CancelExecResponse,
        AgentMessageType::StdinExecRequest => MessageType::StdinExecRequest,
        AgentMessageType::StdinExecResponse => MessageType::StdinExecResponse,
        AgentMessageType::LaunchLspResponse => MessageType::LaunchLspResponse,
        AgentMessageType::Init => return Ok(None),
        other => return Err(UnsupportedType(other as i32)),
    };

    Ok(Some(Message {
        sequence_id: envelope.sequence_id,
        message_type,
        payload: envelope.payload,
    }))
}

/// The body of a relayed request: the byte attempt naming the sandbox plus
/// the inner payload forwarded verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    /// Deprecated alias of `code_source_id`.
    #[serde(default)]
    pub byte_attempt_id: Option<String>,
    /// The byte attempt whose sandbox should receive the payload.
    #[serde(default)]
    pub code_source_id: Option<String>,
    /// Forwarded verbatim to the agent.
    pub payload: serde_json::Value,
}

impl AgentRequest {
    /// The effective code source, honoring the deprecated alias.
    #[must_use]
    pub fn code_source(&self) -> Option<&str> {
        self.code_source_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.byte_attempt_id.as_deref().filter(|s| !s.is_empty()))
    }
}
