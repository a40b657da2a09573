//! Session registry for tracking connected chat clients.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use relay_common::ChatEvent;

/// Information about a connected chat session.
#[derive(Debug, Clone)]
pub struct ConnectedSession {
    /// Opaque session identifier.
    pub id: String,
    /// Peer address, when the listener exposes it.
    pub remote_addr: Option<SocketAddr>,
    /// When the session was upgraded.
    pub connected_at: DateTime<Utc>,
    /// Serialized frames waiting for this session's write loop.
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectedSession {
    /// Whether the session's write loop is still draining its channel.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, frame: String) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Returned to the connection task on registration.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    /// Frames to write to the socket, in broadcast order.
    pub outbound: mpsc::UnboundedReceiver<String>,
}

/// Registry of connected sessions.
///
/// Registration, removal, broadcast and unicast share one lock. A broadcast
/// is fully enqueued to every session before the next one starts, so all
/// sessions see broadcasts in the same order. Enqueueing never waits on a
/// socket: each session drains its own unbounded channel.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ConnectedSession>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly upgraded connection.
    pub async fn register(&self, remote_addr: Option<SocketAddr>) -> SessionHandle {
        let (tx, outbound) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();
        let session = ConnectedSession {
            id: id.clone(),
            remote_addr,
            connected_at: Utc::now(),
            tx,
        };
        self.sessions.lock().await.insert(id.clone(), session);
        SessionHandle { id, outbound }
    }

    /// Remove a session. Removing an unknown session is a no-op.
    pub async fn unregister(&self, id: &str) -> Option<ConnectedSession> {
        self.sessions.lock().await.remove(id)
    }

    /// Deliver an event to every open session.
    ///
    /// Closed sessions are skipped and dropped from the registry. Returns the
    /// number of sessions the event was enqueued to.
    pub async fn broadcast(&self, event: &ChatEvent) -> usize {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode broadcast event {:?}: {}", event, e);
                return 0;
            }
        };

        let mut sessions = self.sessions.lock().await;
        let mut delivered = 0;
        let mut closed = vec![];

        for session in sessions.values() {
            if session.send(frame.clone()) {
                delivered += 1;
            } else {
                closed.push(session.id.clone());
            }
        }

        for id in closed {
            tracing::debug!("Dropping closed session {} during broadcast", id);
            sessions.remove(&id);
        }

        delivered
    }

    /// Deliver an event to one session. Returns false if it is gone or closed.
    pub async fn unicast(&self, id: &str, event: &ChatEvent) -> bool {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode event {:?} for {}: {}", event, id, e);
                return false;
            }
        };

        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|session| session.send(frame))
            .unwrap_or(false)
    }

    /// Get a session by ID.
    pub async fn get(&self, id: &str) -> Option<ConnectedSession> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// IDs of every registered session, in no particular order.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Count connected sessions.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
