pub mod assets;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod logging;
pub mod readiness;
pub mod routes;
pub mod server;
pub mod test_util;

pub use assets::AssetResolver;
pub use chat::{ChatRelay, GenerationSettings, SubmitError};
pub use config::Config;
pub use gateway::SessionRegistry;
pub use inference::{GenerationError, InferenceGateway, OllamaGateway};
pub use readiness::Readiness;

use std::sync::Arc;
use std::time::Duration;

use relay_common::ConversationHistory;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Resolves request paths under the asset root.
    pub assets: AssetResolver,
    /// Open chat sessions.
    pub registry: Arc<SessionRegistry>,
    pub readiness: Arc<Readiness>,
    /// Shared conversation and generation queue.
    pub relay: Arc<ChatRelay>,
}

impl AppState {
    /// Wire the relay together around an inference gateway.
    ///
    /// Spawns the generation worker, so this must run inside a Tokio runtime.
    /// Readiness stays `Loading` until the caller starts the loader.
    pub fn new(config: Config, gateway: Arc<dyn InferenceGateway>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let readiness = Arc::new(Readiness::new());

        let history = ConversationHistory::new(config.inference.system_prompt.clone())
            .with_max_turns(config.history.max_turns);
        let settings = GenerationSettings {
            timeout: Duration::from_secs(config.inference.timeout_secs),
            error_message: config.inference.error_message.clone(),
        };
        let relay = Arc::new(ChatRelay::new(
            registry.clone(),
            readiness.clone(),
            gateway,
            history,
            settings,
        ));

        let assets = AssetResolver::new(
            config.assets.root.clone(),
            config.assets.default_document.clone(),
        );

        Arc::new(Self {
            config,
            assets,
            registry,
            readiness,
            relay,
        })
    }
}
