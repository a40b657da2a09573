//! WebSocket protocol types for relay-client communication.
//!
//! # Protocol Overview
//!
//! Every WebSocket text frame carries exactly one JSON object. Two frame
//! shapes share the channel:
//!
//! - **Control frames** carry a `type` discriminator:
//!   `{"type":"checkModelLoaded"}` (client asks for readiness) and
//!   `{"type":"modelLoaded","loaded":bool}` (server announces readiness,
//!   with `"failed":true` added once loading has failed for good).
//! - **Message envelopes** carry `sender` (`User` or `LLM`) and `message`.
//!   The assistant's `message` is either generated text or the sentinel
//!   `typing`. Failed generations set `"error":true`. User messages
//!   broadcast by the server include the originating `session` id.
//!
//! ## Connection Flow
//!
//! 1. Client upgrades to a WebSocket
//! 2. Client sends `checkModelLoaded`, server answers `modelLoaded` to that client only
//! 3. When loading finishes, every connected client receives one `modelLoaded`
//! 4. Client sends `{"sender":"User","message":"..."}`
//! 5. Every client receives the user message, then `typing`, then the reply

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message text the assistant sends while a reply is being generated.
pub const TYPING_SENTINEL: &str = "typing";

/// Readiness of the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    /// Engine still loading.
    Loading,
    /// Engine loaded and able to generate.
    Ready,
    /// Engine failed to load. Terminal.
    Failed,
}

impl ReadinessState {
    pub fn is_ready(self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ReadinessState::Loading)
    }
}

/// Author tag of a message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    #[serde(rename = "LLM")]
    Llm,
}

/// A chat event, independent of its wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Text typed by a user. `from` is the originating session on broadcasts.
    UserMessage { text: String, from: Option<String> },
    /// The assistant started generating.
    AssistantTyping,
    /// Generated reply.
    AssistantMessage { text: String },
    /// Generation failed.
    AssistantError { text: String },
    /// Client asks whether the engine is ready.
    ReadinessQuery,
    /// Server reports the engine readiness.
    ReadinessAnnounce { state: ReadinessState },
}

/// Errors decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
    #[error("Clients may not send as {0:?}")]
    ForbiddenSender(Sender),
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Event not accepted from clients: {0}")]
    UnexpectedEvent(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ControlFrame {
    CheckModelLoaded,
    ModelLoaded {
        loaded: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        failed: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    sender: Option<Sender>,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    error: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Frame {
    Control(ControlFrame),
    Envelope(Envelope),
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ChatEvent {
    /// Decode one text frame.
    ///
    /// Frames with a `type` field are control frames; everything else must be
    /// a message envelope. An envelope without `sender` is a user message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(kind) = value.get("type") {
            let kind = kind.as_str().unwrap_or_default().to_string();
            let control: ControlFrame =
                serde_json::from_value(value).map_err(|_| ProtocolError::UnknownType(kind))?;
            return Ok(match control {
                ControlFrame::CheckModelLoaded => ChatEvent::ReadinessQuery,
                ControlFrame::ModelLoaded { loaded, failed } => {
                    let state = if failed {
                        ReadinessState::Failed
                    } else if loaded {
                        ReadinessState::Ready
                    } else {
                        ReadinessState::Loading
                    };
                    ChatEvent::ReadinessAnnounce { state }
                }
            });
        }

        let envelope: Envelope = serde_json::from_value(value)?;
        Ok(match envelope.sender.unwrap_or(Sender::User) {
            Sender::User => {
                if envelope.message.trim().is_empty() {
                    return Err(ProtocolError::EmptyMessage);
                }
                ChatEvent::UserMessage {
                    text: envelope.message,
                    from: envelope.session,
                }
            }
            Sender::Llm if envelope.error => ChatEvent::AssistantError {
                text: envelope.message,
            },
            Sender::Llm if envelope.message == TYPING_SENTINEL => ChatEvent::AssistantTyping,
            Sender::Llm => ChatEvent::AssistantMessage {
                text: envelope.message,
            },
        })
    }

    /// Decode a frame received from a client, rejecting server-only events.
    pub fn decode_inbound(text: &str) -> Result<Self, ProtocolError> {
        match Self::decode(text)? {
            event @ (ChatEvent::ReadinessQuery | ChatEvent::UserMessage { .. }) => Ok(event),
            ChatEvent::ReadinessAnnounce { .. } => {
                Err(ProtocolError::UnexpectedEvent("modelLoaded"))
            }
            ChatEvent::AssistantTyping
            | ChatEvent::AssistantMessage { .. }
            | ChatEvent::AssistantError { .. } => Err(ProtocolError::ForbiddenSender(Sender::Llm)),
        }
    }

    /// Encode as one JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_frame())
    }

    fn to_frame(&self) -> Frame {
        match self {
            ChatEvent::ReadinessQuery => Frame::Control(ControlFrame::CheckModelLoaded),
            ChatEvent::ReadinessAnnounce { state } => Frame::Control(ControlFrame::ModelLoaded {
                loaded: state.is_ready(),
                failed: *state == ReadinessState::Failed,
            }),
            ChatEvent::UserMessage { text, from } => Frame::Envelope(Envelope {
                sender: Some(Sender::User),
                message: text.clone(),
                session: from.clone(),
                error: false,
            }),
            ChatEvent::AssistantTyping => Frame::Envelope(Envelope {
                sender: Some(Sender::Llm),
                message: TYPING_SENTINEL.to_string(),
                session: None,
                error: false,
            }),
            ChatEvent::AssistantMessage { text } => Frame::Envelope(Envelope {
                sender: Some(Sender::Llm),
                message: text.clone(),
                session: None,
                error: false,
            }),
            ChatEvent::AssistantError { text } => Frame::Envelope(Envelope {
                sender: Some(Sender::Llm),
                message: text.clone(),
                session: None,
                error: true,
            }),
        }
    }
}
