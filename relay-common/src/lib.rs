//! Chat Relay Common Types
//!
//! Shared types used by the relay server and its clients: the JSON wire
//! protocol, conversation turns and the assistant readiness state.

pub mod chat;
pub mod protocol;

pub use chat::{ConversationHistory, Role, Turn};
pub use protocol::{ChatEvent, ProtocolError, ReadinessState, Sender, TYPING_SENTINEL};
