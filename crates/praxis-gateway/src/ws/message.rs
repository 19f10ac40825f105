//! The gateway-side websocket envelope.
//!
//! Every frame is `{sequence_id, type, payload}`. Responses to a client
//! request preserve the client's `sequence_id`; server-initiated pushes get
//! a fresh one and are fire-and-forget.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Type codes on the gateway side of the wire.
///
/// The low range is shared with the platform's realtime messaging types;
/// the 20+ block belongs to the agent relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum MessageType {
    /// A frame failed envelope or payload validation.
    ValidationError = 3,
    /// Catch-all typed error response.
    GenericError = 4,
    /// Run the exercise code in the sandbox.
    AgentExecRequest = 20,
    /// Execution output from the sandbox.
    AgentExecResponse = 21,
    /// Lint the exercise code.
    AgentLintRequest = 22,
    /// Lint results.
    AgentLintResponse = 23,
    /// Cancel a running command.
    CancelExecRequest = 24,
    /// Cancellation acknowledgement.
    CancelExecResponse = 25,
    /// Stdin for a running command.
    StdinExecRequest = 26,
    /// Stdin acknowledgement.
    StdinExecResponse = 27,
    /// Launch a language server in the sandbox.
    LaunchLspRequest = 28,
    /// Language-server launch acknowledgement.
    LaunchLspResponse = 29,
    /// Keep the workspace alive while the editor is open.
    ByteLivePing = 30,
    /// Persist the editor's code delta.
    ByteUpdateCode = 31,
}

impl MessageType {
    /// Map a wire code to a known type.
    #[must_use]
    pub const fn from_wire(raw: i64) -> Option<Self> {
        Some(match raw {
            3 => Self::ValidationError,
            4 => Self::GenericError,
            20 => Self::AgentExecRequest,
            21 => Self::AgentExecResponse,
            22 => Self::AgentLintRequest,
            23 => Self::AgentLintResponse,
            24 => Self::CancelExecRequest,
            25 => Self::CancelExecResponse,
            26 => Self::StdinExecRequest,
            27 => Self::StdinExecResponse,
            28 => Self::LaunchLspRequest,
            29 => Self::LaunchLspResponse,
            30 => Self::ByteLivePing,
            31 => Self::ByteUpdateCode,
            _ => return None,
        })
    }
}

/// Response codes carried in error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ResponseCode {
    /// The client sent something unusable.
    BadRequest = 0,
    /// The server failed.
    ServerError = 1,
}

/// A websocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation ID; responses echo the request's value.
    pub sequence_id: String,
    /// Type code.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Payload of a `GenericError` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericErrorPayload {
    /// Coarse error class.
    pub code: ResponseCode,
    /// Terse human-readable message.
    pub error: String,
}

/// Payload of a `ValidationError` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorPayload {
    /// The generic error fields.
    #[serde(flatten)]
    pub base: GenericErrorPayload,
    /// Field name to failed-constraint tag.
    pub validation_errors: BTreeMap<String, String>,
}

impl Message {
    /// Prepare a frame, generating a sequence ID when the caller passes an
    /// empty one (server-initiated pushes).
    #[must_use]
    pub fn prepared(sequence_id: &str, message_type: MessageType, payload: impl Serialize) -> Self {
        let sequence_id = if sequence_id.is_empty() {
            new_sequence_id()
        } else {
            sequence_id.to_string()
        };
        Self {
            sequence_id,
            message_type,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// A `GenericError` response addressed to `sequence_id`.
    #[must_use]
    pub fn generic_error(sequence_id: &str, code: ResponseCode, error: &str) -> Self {
        Self::prepared(
            sequence_id,
            MessageType::GenericError,
            GenericErrorPayload {
                code,
                error: error.to_string(),
            },
        )
    }

    /// A `ValidationError` response with field-level tags.
    #[must_use]
    pub fn validation_error(sequence_id: &str, errors: BTreeMap<String, String>) -> Self {
        Self::prepared(
            sequence_id,
            MessageType::ValidationError,
            ValidationErrorPayload {
                base: GenericErrorPayload {
                    code: ResponseCode::BadRequest,
                    error: "validation error".to_string(),
                },
                validation_errors: errors,
            },
        )
    }
}

/// Generate a random 8-byte hex sequence ID for server-initiated frames.
#[must_use]
pub fn new_sequence_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// An inbound frame that failed envelope validation.
#[derive(Debug)]
pub struct EnvelopeRejection {
    /// Whatever sequence ID the frame carried, possibly empty.
    pub sequence_id: String,
    /// Field name to failed-constraint tag.
    pub errors: BTreeMap<String, String>,
}

impl EnvelopeRejection {
    /// The `ValidationError` frame answering this rejection.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::validation_error(&self.sequence_id, self.errors)
    }
}

/// Validate a raw inbound frame against the envelope schema: a non-empty
/// sequence ID, a known non-zero type code, and a payload.
///
/// # Errors
///
/// Returns the field-level tags to echo back in a `ValidationError` frame.
pub fn parse_envelope(raw: &serde_json::Value) -> Result<Message, EnvelopeRejection> {
    let mut errors = BTreeMap::new();

    let sequence_id = raw
        .get("sequence_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    if sequence_id.is_empty() {
        errors.insert("sequence_id".to_string(), "required".to_string());
    }

    let message_type = match raw.get("type").and_then(serde_json::Value::as_i64) {
        None | Some(0) => {
            errors.insert("type".to_string(), "required".to_string());
            None
        }
        Some(code) => {
            let known = MessageType::from_wire(code);
            if known.is_none() {
                errors.insert("type".to_string(), "unknown".to_string());
            }
            known
        }
    };

    let payload = raw.get("payload").cloned();
    if payload.is_none() || payload == Some(serde_json::Value::Null) {
        errors.insert("payload".to_string(), "required".to_string());
    }

    match (message_type, payload) {
        (Some(message_type), Some(payload)) if errors.is_empty() => Ok(Message {
            sequence_id,
            message_type,
            payload,
        }),
        _ => Err(EnvelopeRejection {
            sequence_id,
            errors,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        let message = Message::prepared(
            "abc123",
            MessageType::AgentExecRequest,
            serde_json::json!({"code_source_id": "42"}),
        );
        let text = serde_json::to_string(&message).unwrap();
        assert!(text.contains("\"type\":20"));
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.sequence_id, "abc123");
        assert_eq!(back.message_type, MessageType::AgentExecRequest);
    }

    #[test]
    fn empty_sequence_id_gets_generated() {
        let message = Message::prepared("", MessageType::GenericError, serde_json::json!({}));
        assert_eq!(message.sequence_id.len(), 16);
    }

    #[test]
    fn missing_sequence_id_is_rejected() {
        let raw = serde_json::json!({"type": 20, "payload": {}});
        let rejection = parse_envelope(&raw).unwrap_err();
        assert_eq!(rejection.errors.get("sequence_id").unwrap(), "required");
    }

    #[test]
    fn zero_and_unknown_types_are_rejected() {
        let raw = serde_json::json!({"sequence_id": "x", "type": 0, "payload": {}});
        let rejection = parse_envelope(&raw).unwrap_err();
        assert_eq!(rejection.errors.get("type").unwrap(), "required");

        let raw = serde_json::json!({"sequence_id": "x", "type": 999, "payload": {}});
        let rejection = parse_envelope(&raw).unwrap_err();
        assert_eq!(rejection.errors.get("type").unwrap(), "unknown");
    }

    #[test]
    fn valid_envelope_parses() {
        let raw = serde_json::json!({
            "sequence_id": "seq-1",
            "type": 30,
            "payload": {"byte_attempt_id": "7"},
        });
        let message = parse_envelope(&raw).unwrap();
        assert_eq!(message.message_type, MessageType::ByteLivePing);
    }

    #[test]
    fn validation_error_payload_flattens() {
        let mut errors = BTreeMap::new();
        errors.insert("type".to_string(), "required".to_string());
        let message = Message::validation_error("s", errors);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["payload"]["code"], 0);
        assert_eq!(value["payload"]["error"], "validation error");
        assert_eq!(value["payload"]["validation_errors"]["type"], "required");
    }
}
