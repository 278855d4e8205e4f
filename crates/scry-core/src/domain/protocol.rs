//! Wire protocol of the inference socket (JSON text frames).
//!
//! Inbound frames are decoded leniently: anything that does not carry the
//! fields its `type` needs is reported as [`Decoded::Ignored`] so the client
//! can drop it without tearing the connection down.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Correlation id tying an outbound prompt to its inbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    /// Fresh client-side id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PromptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PromptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state of the socket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Server status notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Started {
        prompt_id: Option<PromptId>,
        session_id: Option<String>,
    },
    Canceled {
        prompt_id: Option<PromptId>,
    },
    MemoryCleared {
        session_id: Option<String>,
    },
}

/// A well-formed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Token { prompt_id: PromptId, token: String },
    Complete { prompt_id: PromptId },
    Error {
        prompt_id: Option<PromptId>,
        error: String,
    },
    Status(StatusUpdate),
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(InboundMessage),
    /// Valid JSON, but not something the client acts on (unknown type,
    /// missing required field, server greeting).
    Ignored { kind: Option<String> },
}

/// Frame was not a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed socket message: {0}")]
pub struct MalformedMessage(pub String);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    prompt_id: Option<String>,
    token: Option<String>,
    complete: Option<bool>,
    error: Option<String>,
    status: Option<String>,
    session_id: Option<String>,
}

impl InboundMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Decoded, MalformedMessage> {
        let raw: RawMessage =
            serde_json::from_str(text).map_err(|e| MalformedMessage(e.to_string()))?;
        Ok(raw.classify())
    }
}

impl RawMessage {
    fn classify(self) -> Decoded {
        let prompt_id = self.prompt_id.filter(|id| !id.is_empty()).map(PromptId);

        let message = match self.kind.as_deref() {
            Some("token") => match (prompt_id, self.token.filter(|t| !t.is_empty())) {
                (Some(prompt_id), Some(token)) => Some(InboundMessage::Token { prompt_id, token }),
                _ => None,
            },
            Some("complete") if self.complete != Some(false) => {
                prompt_id.map(|prompt_id| InboundMessage::Complete { prompt_id })
            }
            Some("error") => self
                .error
                .filter(|e| !e.is_empty())
                .map(|error| InboundMessage::Error { prompt_id, error }),
            Some("status") => {
                status_update(self.status.as_deref(), prompt_id, self.session_id)
                    .map(InboundMessage::Status)
            }
            // Some servers put the status directly in `type`.
            Some(kind @ ("started" | "canceled" | "memory_cleared")) => {
                status_update(Some(kind), prompt_id, self.session_id).map(InboundMessage::Status)
            }
            _ => None,
        };

        match message {
            Some(message) => Decoded::Message(message),
            None => Decoded::Ignored { kind: self.kind },
        }
    }
}

fn status_update(
    status: Option<&str>,
    prompt_id: Option<PromptId>,
    session_id: Option<String>,
) -> Option<StatusUpdate> {
    match status? {
        "started" => Some(StatusUpdate::Started {
            prompt_id,
            session_id,
        }),
        "canceled" => Some(StatusUpdate::Canceled { prompt_id }),
        "memory_cleared" => Some(StatusUpdate::MemoryCleared { session_id }),
        _ => None,
    }
}

/// Frames sent to the inference socket.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Caller-supplied object with `promptId` merged in.
    Prompt {
        prompt_id: PromptId,
        payload: Map<String, Value>,
    },
    Cancel { prompt_id: PromptId },
    ClearMemory,
}

impl OutboundMessage {
    /// Build a prompt frame. Returns `None` unless `payload` is a JSON object.
    #[must_use]
    pub fn prompt(payload: Value, prompt_id: PromptId) -> Option<Self> {
        match payload {
            Value::Object(payload) => Some(Self::Prompt { prompt_id, payload }),
            _ => None,
        }
    }

    /// Render as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Prompt { prompt_id, payload } => {
                let mut object = payload.clone();
                object.insert("promptId".to_string(), Value::String(prompt_id.0.clone()));
                Value::Object(object)
            }
            Self::Cancel { prompt_id } => serde_json::json!({
                "action": "cancel",
                "promptId": prompt_id.as_str(),
            }),
            Self::ClearMemory => serde_json::json!({ "action": "clear_memory" }),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> InboundMessage {
        match InboundMessage::decode(text).unwrap() {
            Decoded::Message(m) => m,
            Decoded::Ignored { kind } => panic!("ignored frame of kind {kind:?}"),
        }
    }

    fn ignored(text: &str) -> bool {
        matches!(InboundMessage::decode(text), Ok(Decoded::Ignored { .. }))
    }

    #[test]
    fn decodes_token_frames() {
        assert_eq!(
            message(r#"{"type":"token","promptId":"p1","token":"Hel"}"#),
            InboundMessage::Token {
                prompt_id: "p1".into(),
                token: "Hel".to_string()
            }
        );
    }

    #[test]
    fn token_without_text_is_ignored() {
        assert!(ignored(r#"{"type":"token","promptId":"p1","token":""}"#));
        assert!(ignored(r#"{"type":"token","promptId":"p1"}"#));
        assert!(ignored(r#"{"type":"token","token":"x"}"#));
    }

    #[test]
    fn complete_accepts_flag_or_bare_frame() {
        assert_eq!(
            message(r#"{"type":"complete","promptId":"p1","complete":true}"#),
            InboundMessage::Complete {
                prompt_id: "p1".into()
            }
        );
        assert_eq!(
            message(r#"{"type":"complete","promptId":"p2"}"#),
            InboundMessage::Complete {
                prompt_id: "p2".into()
            }
        );
        assert!(ignored(r#"{"type":"complete","promptId":"p1","complete":false}"#));
    }

    #[test]
    fn error_may_omit_prompt_id() {
        assert_eq!(
            message(r#"{"type":"error","error":"Empty prompt"}"#),
            InboundMessage::Error {
                prompt_id: None,
                error: "Empty prompt".to_string()
            }
        );
        assert!(ignored(r#"{"type":"error","promptId":"p1"}"#));
    }

    #[test]
    fn status_sub_types_dispatch() {
        assert_eq!(
            message(r#"{"type":"status","status":"started","promptId":"p","sessionId":"s"}"#),
            InboundMessage::Status(StatusUpdate::Started {
                prompt_id: Some("p".into()),
                session_id: Some("s".to_string())
            })
        );
        assert_eq!(
            message(r#"{"type":"status","status":"canceled","promptId":"p"}"#),
            InboundMessage::Status(StatusUpdate::Canceled {
                prompt_id: Some("p".into())
            })
        );
        assert_eq!(
            message(r#"{"type":"memory_cleared","sessionId":"s","status":"history_cleared"}"#),
            InboundMessage::Status(StatusUpdate::MemoryCleared {
                session_id: Some("s".to_string())
            })
        );
        assert!(ignored(r#"{"type":"status","status":"warming_up"}"#));
    }

    #[test]
    fn greeting_and_unknown_types_are_ignored() {
        assert_eq!(
            InboundMessage::decode(r#"{"type":"ready","message":"Model is ready"}"#).unwrap(),
            Decoded::Ignored {
                kind: Some("ready".to_string())
            }
        );
        assert!(ignored("{}"));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(InboundMessage::decode("not json").is_err());
        assert!(InboundMessage::decode("[1,2]").is_err());
    }

    #[test]
    fn prompt_merges_id_into_payload() {
        let id = PromptId::from("abc");
        let frame = OutboundMessage::prompt(
            serde_json::json!({"action":"prompt","prompt":"hi"}),
            id.clone(),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(value["promptId"], "abc");
        assert_eq!(value["prompt"], "hi");
        assert_eq!(value["action"], "prompt");
    }

    #[test]
    fn prompt_requires_an_object() {
        assert!(OutboundMessage::prompt(serde_json::json!("hi"), PromptId::generate()).is_none());
    }

    #[test]
    fn control_frames_encode() {
        let cancel: Value = serde_json::from_str(
            &OutboundMessage::Cancel {
                prompt_id: "p".into(),
            }
            .encode(),
        )
        .unwrap();
        assert_eq!(cancel, serde_json::json!({"action":"cancel","promptId":"p"}));

        let clear: Value = serde_json::from_str(&OutboundMessage::ClearMemory.encode()).unwrap();
        assert_eq!(clear, serde_json::json!({"action":"clear_memory"}));
    }
}
