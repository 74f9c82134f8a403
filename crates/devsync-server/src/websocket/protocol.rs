//! JSON message shapes exchanged over a room socket.
//!
//! Every message is an object with a `"type"` discriminator. Inbound messages
//! other than `auth` and `code_update` decode to [`ClientMessage::Unknown`] and
//! are ignored; text that is not a JSON object with a string `"type"` is a
//! [`ProtocolError`].

use std::sync::Arc;

use devsync_core::UserId;
use serde::{Deserialize, Serialize};

use super::notify::Notification;
use crate::executor::ExecutionOutput;

/// Failure to decode an inbound frame or encode an outbound one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound text is not a recognizable message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A message sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identity handshake.
    Auth {
        /// Identity-provider UID.
        user_uid: UserId,
    },
    /// Full replacement of the room's code.
    CodeUpdate {
        /// New document content.
        code: String,
    },
    /// Any other `type`.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

/// A message the server pushes to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Code change made by another participant.
    CodeUpdate {
        /// New document content.
        code: String,
    },
    /// Output of a run triggered for the room.
    ExecutionResult {
        /// Captured process output.
        output: ExecutionOutput,
    },
    /// Per-user notification.
    Notification(Notification),
}

impl ServerMessage {
    /// Serialize to a shareable text frame.
    pub fn encode(&self) -> Result<Arc<String>, ProtocolError> {
        serde_json::to_string(self)
            .map(Arc::new)
            .map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_auth() {
        let msg = ClientMessage::decode(r#"{"type":"auth","user_uid":"u1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Auth {
                user_uid: "u1".into()
            }
        );
    }

    #[test]
    fn decode_code_update_ignores_extra_fields() {
        let msg =
            ClientMessage::decode(r#"{"type":"code_update","code":"x=1","cursor":4}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CodeUpdate {
                code: "x=1".into()
            }
        );
    }

    #[test]
    fn decode_unknown_type() {
        let msg = ClientMessage::decode(r#"{"type":"cursor_move","line":3}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn decode_rejects_non_json() {
        assert_matches!(
            ClientMessage::decode("not json"),
            Err(ProtocolError::Malformed(_))
        );
    }

    #[test]
    fn decode_rejects_missing_type() {
        assert!(ClientMessage::decode(r#"{"code":"x"}"#).is_err());
    }

    #[test]
    fn decode_rejects_auth_without_uid() {
        assert!(ClientMessage::decode(r#"{"type":"auth"}"#).is_err());
    }

    #[test]
    fn decode_rejects_code_update_without_code() {
        assert!(ClientMessage::decode(r#"{"type":"code_update"}"#).is_err());
    }

    #[test]
    fn encode_code_update() {
        let text = ServerMessage::CodeUpdate {
            code: "print(1)".into(),
        }
        .encode()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "code_update", "code": "print(1)"}));
    }

    #[test]
    fn encode_execution_result() {
        let output = ExecutionOutput {
            stdout: "hi\n".into(),
            stderr: String::new(),
            returncode: 0,
        };
        let text = ServerMessage::ExecutionResult { output }.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "execution_result",
                "output": {"stdout": "hi\n", "stderr": "", "returncode": 0}
            })
        );
    }
}
