//! Single-slot generation queue.
//!
//! Generation requests are queued FIFO and executed one at a time by a
//! dedicated worker task, so the inference engine never sees two concurrent
//! calls. Callers enqueue and return immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};

use relay_common::{ChatEvent, ConversationHistory, Turn};

use crate::gateway::SessionRegistry;
use crate::inference::{GenerationError, InferenceGateway};

/// How generations are run and reported.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Upper bound on one engine call.
    pub timeout: Duration,
    /// Text broadcast when a generation fails.
    pub error_message: String,
}

/// A queued request for the assistant's next turn.
#[derive(Debug)]
pub struct GenerationJob {
    /// Session whose message triggered the generation.
    pub requested_by: String,
    /// When the job was enqueued.
    pub enqueued_at: Instant,
}

/// Returned when the worker is gone (runtime shutting down).
#[derive(Debug, thiserror::Error)]
#[error("Generation queue is closed")]
pub struct QueueClosed;

/// Handle for submitting generation jobs.
pub struct GenerationQueue {
    tx: mpsc::UnboundedSender<GenerationJob>,
    pending: Arc<AtomicUsize>,
}

impl GenerationQueue {
    /// Spawn the worker task and return the queue feeding it.
    pub fn spawn(
        gateway: Arc<dyn InferenceGateway>,
        history: Arc<Mutex<ConversationHistory>>,
        registry: Arc<SessionRegistry>,
        settings: GenerationSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = GenerationWorker {
            gateway,
            history,
            registry,
            settings,
            pending: pending.clone(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx, pending }
    }

    /// Queue a generation behind any already waiting.
    pub fn enqueue(&self, requested_by: &str) -> Result<(), QueueClosed> {
        let job = GenerationJob {
            requested_by: requested_by.to_string(),
            enqueued_at: Instant::now(),
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            QueueClosed
        })
    }

    /// Jobs queued or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

struct GenerationWorker {
    gateway: Arc<dyn InferenceGateway>,
    history: Arc<Mutex<ConversationHistory>>,
    registry: Arc<SessionRegistry>,
    settings: GenerationSettings,
    pending: Arc<AtomicUsize>,
}

impl GenerationWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<GenerationJob>) {
        while let Some(job) = rx.recv().await {
            self.process(job).await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        tracing::debug!("Generation worker stopped");
    }

    async fn process(&self, job: GenerationJob) {
        // Snapshot at dispatch time so queued jobs see every earlier turn.
        let turns = self.history.lock().await.snapshot();

        tracing::info!(
            "Generating reply for session {} ({} turns, queued {}ms)",
            job.requested_by,
            turns.len(),
            job.enqueued_at.elapsed().as_millis()
        );
        let started = Instant::now();

        let generation = self.gateway.generate(&turns);
        let result = match tokio::time::timeout(self.settings.timeout, generation).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.settings.timeout.as_secs())),
        };

        match result {
            Ok(text) => {
                let mut history = self.history.lock().await;
                history.push(Turn::assistant(text.clone()));
                let delivered = self
                    .registry
                    .broadcast(&ChatEvent::AssistantMessage { text })
                    .await;
                tracing::info!(
                    "Reply for session {} generated in {}ms, delivered to {} sessions",
                    job.requested_by,
                    started.elapsed().as_millis(),
                    delivered
                );
            }
            Err(e) => {
                tracing::error!("Error during response generation for {}: {}", job.requested_by, e);
                self.registry
                    .broadcast(&ChatEvent::AssistantError {
                        text: self.settings.error_message.clone(),
                    })
                    .await;
            }
        }
    }
}
