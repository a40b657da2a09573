//! Shared chat room logic.
//!
//! One conversation is shared by every connected session: user messages are
//! mirrored to the whole room and every reply is broadcast to everyone.

mod queue;

pub use queue::{GenerationJob, GenerationQueue, GenerationSettings, QueueClosed};

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use relay_common::{ChatEvent, ConversationHistory, ReadinessState, Turn};

use crate::gateway::SessionRegistry;
use crate::inference::InferenceGateway;
use crate::readiness::Readiness;

/// Why a user message was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Assistant is not ready (state: {0:?})")]
    NotReady(ReadinessState),
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}

/// Relays chat events between sessions and the inference engine.
///
/// Lock order is history, then registry. The history lock is never held
/// across an engine call.
pub struct ChatRelay {
    registry: Arc<SessionRegistry>,
    readiness: Arc<Readiness>,
    gateway: Arc<dyn InferenceGateway>,
    history: Arc<Mutex<ConversationHistory>>,
    queue: GenerationQueue,
    /// Orders readiness replies against the readiness broadcast.
    readiness_order: Mutex<()>,
}

impl ChatRelay {
    /// Create the relay and spawn its generation worker.
    pub fn new(
        registry: Arc<SessionRegistry>,
        readiness: Arc<Readiness>,
        gateway: Arc<dyn InferenceGateway>,
        history: ConversationHistory,
        settings: GenerationSettings,
    ) -> Self {
        let history = Arc::new(Mutex::new(history));
        let queue = GenerationQueue::spawn(
            gateway.clone(),
            history.clone(),
            registry.clone(),
            settings,
        );
        Self {
            registry,
            readiness,
            gateway,
            history,
            queue,
            readiness_order: Mutex::new(()),
        }
    }

    /// Decode and handle one text frame from a session.
    ///
    /// Malformed frames are logged and dropped; the session stays open.
    pub async fn handle_frame(&self, session_id: &str, frame: &str) {
        match ChatEvent::decode_inbound(frame) {
            Ok(event) => self.handle_event(session_id, event).await,
            Err(e) => tracing::warn!("Dropping frame from session {}: {}", session_id, e),
        }
    }

    /// Handle one decoded event from a session.
    pub async fn handle_event(&self, session_id: &str, event: ChatEvent) {
        match event {
            ChatEvent::ReadinessQuery => self.reply_readiness(session_id).await,
            ChatEvent::UserMessage { text, .. } => {
                if let Err(e) = self.submit(session_id, text).await {
                    tracing::warn!("Rejected message from session {}: {}", session_id, e);
                }
            }
            other => tracing::warn!("Ignoring {:?} from session {}", other, session_id),
        }
    }

    /// Accept a user message into the shared conversation.
    ///
    /// Appends the user turn, broadcasts the message and the typing
    /// indicator, then queues a generation. Returns without waiting for the
    /// reply. Rejected unless the assistant is ready.
    pub async fn submit(&self, session_id: &str, text: String) -> Result<(), SubmitError> {
        let state = self.readiness.query();
        if !state.is_ready() {
            return Err(SubmitError::NotReady(state));
        }

        {
            let mut history = self.history.lock().await;
            history.push(Turn::user(text.clone()));
            self.registry
                .broadcast(&ChatEvent::UserMessage {
                    text,
                    from: Some(session_id.to_string()),
                })
                .await;
            self.registry.broadcast(&ChatEvent::AssistantTyping).await;
        }

        self.queue.enqueue(session_id)?;
        Ok(())
    }

    /// Send the current readiness to one session.
    pub async fn reply_readiness(&self, session_id: &str) {
        let _order = self.readiness_order.lock().await;
        let state = self.readiness.query();
        self.registry
            .unicast(session_id, &ChatEvent::ReadinessAnnounce { state })
            .await;
    }

    /// Record the loading outcome and tell every connected session.
    pub async fn announce_readiness(&self, outcome: ReadinessState) {
        let _order = self.readiness_order.lock().await;
        self.readiness.announce(outcome);
        let delivered = self
            .registry
            .broadcast(&ChatEvent::ReadinessAnnounce { state: outcome })
            .await;
        tracing::info!("Readiness {:?} announced to {} sessions", outcome, delivered);
    }

    /// Warm up the engine in the background and announce the outcome.
    pub fn spawn_readiness_loader(self: &Arc<Self>) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            tracing::info!("Starting model loading...");
            let outcome = match relay.gateway.warm_up().await {
                Ok(()) => {
                    tracing::info!("Model loaded successfully");
                    ReadinessState::Ready
                }
                Err(e) => {
                    tracing::error!("Error loading model: {}", e);
                    ReadinessState::Failed
                }
            };
            relay.announce_readiness(outcome).await;
        })
    }

    /// Current readiness.
    pub fn readiness(&self) -> ReadinessState {
        self.readiness.query()
    }

    /// Copy of the shared conversation.
    pub async fn history(&self) -> Vec<Turn> {
        self.history.lock().await.snapshot()
    }

    /// Generations queued or in flight.
    pub fn pending_generations(&self) -> usize {
        self.queue.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::gateway::SessionHandle;
    use crate::test_util::ScriptedGateway;

    const ERROR_TEXT: &str = "Error generating response.";

    fn settings() -> GenerationSettings {
        GenerationSettings {
            timeout: Duration::from_secs(5),
            error_message: ERROR_TEXT.to_string(),
        }
    }

    fn relay_with(
        gateway: Arc<ScriptedGateway>,
        settings: GenerationSettings,
    ) -> (Arc<ChatRelay>, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let relay = ChatRelay::new(
            registry.clone(),
            Arc::new(Readiness::new()),
            gateway,
            ConversationHistory::new(Some("Teach French.".to_string())),
            settings,
        );
        (Arc::new(relay), registry)
    }

    async fn ready_relay(gateway: Arc<ScriptedGateway>) -> (Arc<ChatRelay>, Arc<SessionRegistry>) {
        let (relay, registry) = relay_with(gateway, settings());
        relay.announce_readiness(ReadinessState::Ready).await;
        (relay, registry)
    }

    async fn next_event(handle: &mut SessionHandle) -> ChatEvent {
        let frame = tokio::time::timeout(Duration::from_secs(5), handle.outbound.recv())
            .await
            .expect("timed out waiting for event")
            .expect("session channel closed");
        ChatEvent::decode(&frame).unwrap()
    }

    async fn wait_idle(relay: &ChatRelay) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while relay.pending_generations() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("generations did not finish");
    }

    fn user(text: &str, from: &str) -> ChatEvent {
        ChatEvent::UserMessage {
            text: text.to_string(),
            from: Some(from.to_string()),
        }
    }

    #[tokio::test]
    async fn test_readiness_query_before_and_after_loading() {
        let (relay, registry) = relay_with(Arc::new(ScriptedGateway::echo()), settings());
        let mut early = registry.register(None).await;

        relay.handle_frame(&early.id, r#"{"type":"checkModelLoaded"}"#).await;
        assert_eq!(
            next_event(&mut early).await,
            ChatEvent::ReadinessAnnounce {
                state: ReadinessState::Loading
            }
        );

        relay.announce_readiness(ReadinessState::Ready).await;
        assert_eq!(
            next_event(&mut early).await,
            ChatEvent::ReadinessAnnounce {
                state: ReadinessState::Ready
            }
        );

        let mut late = registry.register(None).await;
        relay.handle_frame(&late.id, r#"{"type":"checkModelLoaded"}"#).await;
        assert_eq!(
            next_event(&mut late).await,
            ChatEvent::ReadinessAnnounce {
                state: ReadinessState::Ready
            }
        );
    }

    #[tokio::test]
    async fn test_message_before_ready_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::echo());
        let (relay, registry) = relay_with(gateway.clone(), settings());
        let mut session = registry.register(None).await;

        let err = relay.submit(&session.id, "Bonjour".to_string()).await.unwrap_err();

        assert!(matches!(err, SubmitError::NotReady(ReadinessState::Loading)));
        assert_eq!(relay.history().await.len(), 1);
        assert!(session.outbound.try_recv().is_err());
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_message_after_failed_loading_is_rejected() {
        let (relay, registry) = relay_with(Arc::new(ScriptedGateway::echo()), settings());
        relay.announce_readiness(ReadinessState::Failed).await;
        let session = registry.register(None).await;

        let err = relay.submit(&session.id, "Bonjour".to_string()).await.unwrap_err();
        assert!(matches!(err, SubmitError::NotReady(ReadinessState::Failed)));
    }

    #[tokio::test]
    async fn test_message_flow_reaches_every_session() {
        let gateway = Arc::new(ScriptedGateway::echo());
        let (relay, registry) = ready_relay(gateway.clone()).await;
        let mut a = registry.register(None).await;
        let mut b = registry.register(None).await;
        let sender = a.id.clone();

        relay.handle_frame(&sender, r#"{"sender":"User","message":"Bonjour"}"#).await;

        for session in [&mut a, &mut b] {
            assert_eq!(next_event(session).await, user("Bonjour", &sender));
            assert_eq!(next_event(session).await, ChatEvent::AssistantTyping);
            assert_eq!(
                next_event(session).await,
                ChatEvent::AssistantMessage {
                    text: ScriptedGateway::reply_for("Bonjour")
                }
            );
        }

        wait_idle(&relay).await;
        assert_eq!(
            relay.history().await,
            vec![
                Turn::system("Teach French."),
                Turn::user("Bonjour"),
                Turn::assistant(ScriptedGateway::reply_for("Bonjour")),
            ]
        );
        assert_eq!(
            gateway.histories(),
            vec![vec![Turn::system("Teach French."), Turn::user("Bonjour")]]
        );
    }

    #[tokio::test]
    async fn test_zero_turn_cap_still_sends_user_message() {
        let gateway = Arc::new(ScriptedGateway::echo());
        let registry = Arc::new(SessionRegistry::new());
        let relay = ChatRelay::new(
            registry.clone(),
            Arc::new(Readiness::new()),
            gateway.clone(),
            ConversationHistory::new(Some("Teach French.".to_string())).with_max_turns(Some(0)),
            settings(),
        );
        relay.announce_readiness(ReadinessState::Ready).await;
        let session = registry.register(None).await;

        relay.submit(&session.id, "Bonjour".to_string()).await.unwrap();
        wait_idle(&relay).await;

        assert_eq!(
            gateway.histories(),
            vec![vec![Turn::system("Teach French."), Turn::user("Bonjour")]]
        );
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_history_untouched() {
        let (relay, registry) = ready_relay(Arc::new(ScriptedGateway::failing())).await;
        let mut session = registry.register(None).await;
        let id = session.id.clone();

        relay.submit(&id, "Je suis allé".to_string()).await.unwrap();

        assert_eq!(next_event(&mut session).await, user("Je suis allé", &id));
        assert_eq!(next_event(&mut session).await, ChatEvent::AssistantTyping);
        assert_eq!(
            next_event(&mut session).await,
            ChatEvent::AssistantError {
                text: ERROR_TEXT.to_string()
            }
        );

        wait_idle(&relay).await;
        assert_eq!(
            relay.history().await,
            vec![Turn::system("Teach French."), Turn::user("Je suis allé")]
        );
    }

    #[tokio::test]
    async fn test_session_usable_after_failure() {
        let (relay, registry) = ready_relay(Arc::new(ScriptedGateway::failing())).await;
        let session = registry.register(None).await;

        relay.submit(&session.id, "un".to_string()).await.unwrap();
        relay.submit(&session.id, "deux".to_string()).await.unwrap();
        wait_idle(&relay).await;

        assert_eq!(relay.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_generation_timeout_reports_error() {
        let gateway = Arc::new(ScriptedGateway::echo().with_delay(Duration::from_secs(30)));
        let settings = GenerationSettings {
            timeout: Duration::from_millis(50),
            error_message: ERROR_TEXT.to_string(),
        };
        let (relay, registry) = relay_with(gateway, settings);
        relay.announce_readiness(ReadinessState::Ready).await;
        let mut session = registry.register(None).await;

        relay.submit(&session.id, "Bonjour".to_string()).await.unwrap();

        next_event(&mut session).await;
        next_event(&mut session).await;
        assert!(matches!(
            next_event(&mut session).await,
            ChatEvent::AssistantError { .. }
        ));
    }

    #[tokio::test]
    async fn test_at_most_one_generation_in_flight() {
        let gateway = Arc::new(ScriptedGateway::echo().with_delay(Duration::from_millis(20)));
        let (relay, registry) = ready_relay(gateway.clone()).await;
        let mut sessions = vec![];
        for _ in 0..4 {
            sessions.push(registry.register(None).await);
        }

        let submissions: Vec<_> = sessions
            .iter()
            .enumerate()
            .map(|(i, session)| {
                let relay = relay.clone();
                let id = session.id.clone();
                tokio::spawn(async move {
                    for n in 0..3 {
                        relay.submit(&id, format!("message {}-{}", i, n)).await.unwrap();
                    }
                })
            })
            .collect();
        for submission in submissions {
            submission.await.unwrap();
        }
        wait_idle(&relay).await;

        assert_eq!(gateway.calls(), 12);
        assert_eq!(gateway.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_generation() {
        let gateway = Arc::new(ScriptedGateway::echo().with_delay(Duration::from_secs(30)));
        let (relay, registry) = ready_relay(gateway).await;
        let session = registry.register(None).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            relay.submit(&session.id, "un".to_string()).await.unwrap();
            relay.submit(&session.id, "deux".to_string()).await.unwrap();
        })
        .await
        .expect("submit blocked on generation");

        assert_eq!(relay.pending_generations(), 2);
        assert_eq!(relay.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_all_sessions_observe_same_order() {
        let gateway = Arc::new(ScriptedGateway::echo().with_delay(Duration::from_millis(5)));
        let (relay, registry) = ready_relay(gateway).await;
        let mut sessions = vec![];
        for _ in 0..3 {
            sessions.push(registry.register(None).await);
        }

        let submissions: Vec<_> = sessions
            .iter()
            .map(|session| {
                let relay = relay.clone();
                let id = session.id.clone();
                tokio::spawn(async move {
                    for n in 0..4 {
                        relay.submit(&id, format!("{} says {}", id, n)).await.unwrap();
                    }
                })
            })
            .collect();
        for submission in submissions {
            submission.await.unwrap();
        }
        wait_idle(&relay).await;

        let mut observed = vec![];
        for session in sessions.iter_mut() {
            let mut events = vec![];
            while let Ok(frame) = session.outbound.try_recv() {
                events.push(ChatEvent::decode(&frame).unwrap());
            }
            observed.push(events);
        }

        // 12 user messages, 12 typing indicators, 12 replies.
        assert_eq!(observed[0].len(), 36);
        assert!(observed.iter().all(|events| events == &observed[0]));
    }

    #[tokio::test]
    async fn test_disconnect_does_not_cancel_generation() {
        let gateway = Arc::new(ScriptedGateway::echo().with_delay(Duration::from_millis(50)));
        let (relay, registry) = ready_relay(gateway.clone()).await;
        let leaving = registry.register(None).await;
        let mut staying = registry.register(None).await;

        relay.submit(&leaving.id, "Au revoir".to_string()).await.unwrap();
        registry.unregister(&leaving.id).await;
        drop(leaving);

        next_event(&mut staying).await;
        next_event(&mut staying).await;
        assert_eq!(
            next_event(&mut staying).await,
            ChatEvent::AssistantMessage {
                text: ScriptedGateway::reply_for("Au revoir")
            }
        );
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let (relay, registry) = ready_relay(Arc::new(ScriptedGateway::echo())).await;
        let mut session = registry.register(None).await;

        relay.handle_frame(&session.id, "{not json").await;
        relay.handle_frame(&session.id, r#"{"sender":"LLM","message":"spoof"}"#).await;

        assert!(session.outbound.try_recv().is_err());
        assert_eq!(relay.history().await.len(), 1);
        assert!(registry.get(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn test_readiness_loader_announces_to_connected_sessions() {
        let (relay, registry) = relay_with(Arc::new(ScriptedGateway::echo()), settings());
        let mut session = registry.register(None).await;

        relay.spawn_readiness_loader().await.unwrap();

        assert_eq!(relay.readiness(), ReadinessState::Ready);
        assert_eq!(
            next_event(&mut session).await,
            ChatEvent::ReadinessAnnounce {
                state: ReadinessState::Ready
            }
        );
    }

    #[tokio::test]
    async fn test_readiness_loader_reports_failure() {
        let gateway = Arc::new(ScriptedGateway::echo().with_failed_warm_up());
        let (relay, registry) = relay_with(gateway, settings());
        let mut session = registry.register(None).await;

        relay.spawn_readiness_loader().await.unwrap();

        assert_eq!(relay.readiness(), ReadinessState::Failed);
        assert_eq!(
            next_event(&mut session).await,
            ChatEvent::ReadinessAnnounce {
                state: ReadinessState::Failed
            }
        );
    }
}
