//! Gateway module for chat sessions.
//!
//! This module provides:
//! - WebSocket handler driving each session
//! - Session registry for tracking connected sessions and fanning out events

mod registry;
pub mod ws;

pub use registry::{ConnectedSession, SessionHandle, SessionRegistry};
pub use ws::ws_handler;
