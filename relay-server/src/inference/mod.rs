//! Inference engine seam.
//!
//! The relay only needs two things from an engine: a warm-up call whose
//! outcome decides readiness, and text generation from a conversation.

mod ollama;

pub use ollama::OllamaGateway;

use async_trait::async_trait;
use relay_common::Turn;

/// Errors from the inference engine.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("Engine error: {0}")]
    EngineError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Engine returned an empty reply")]
    EmptyResponse,
    #[error("Generation timed out after {0}s")]
    Timeout(u64),
}

/// Turns a conversation into generated text.
///
/// Implementations need not support concurrent calls; the relay never has
/// more than one `generate` outstanding.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Load the model so later generations are served. Called once at startup.
    async fn warm_up(&self) -> Result<(), GenerationError>;

    /// Generate the assistant's next turn for `history`.
    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError>;
}
