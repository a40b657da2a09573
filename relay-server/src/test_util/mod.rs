pub mod mock_ollama;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use relay_common::{Role, Turn};

use crate::config::{AssetsConfig, Config, TlsConfig};
use crate::inference::{GenerationError, InferenceGateway};

/// Config for tests: plaintext listener, assets under `root`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.tls = TlsConfig {
        enabled: false,
        ..TlsConfig::default()
    };
    config.assets = AssetsConfig {
        root: root.to_path_buf(),
        default_document: "index.html".to_string(),
        not_found_page: root.join("404.html"),
    };
    config.inference.system_prompt = Some("Teach French.".to_string());
    config.inference.timeout_secs = 5;
    config
}

#[derive(Debug, Clone, Copy)]
enum Replies {
    Echo,
    Fail,
}

/// In-process inference gateway with scripted behavior.
///
/// Records every history it is asked to continue and the highest number of
/// overlapping `generate` calls.
pub struct ScriptedGateway {
    replies: Replies,
    warm_up_ok: bool,
    delay: Duration,
    warm_up_gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    histories: Mutex<Vec<Vec<Turn>>>,
}

/// Holds a gated gateway's warm-up until opened.
#[derive(Clone)]
pub struct WarmUpGate(Arc<Semaphore>);

impl WarmUpGate {
    pub fn open(&self) {
        self.0.add_permits(1);
    }
}

impl ScriptedGateway {
    /// Replies with [`ScriptedGateway::reply_for`] the last user turn.
    pub fn echo() -> Self {
        Self {
            replies: Replies::Echo,
            warm_up_ok: true,
            delay: Duration::ZERO,
            warm_up_gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            histories: Mutex::new(vec![]),
        }
    }

    /// Every generation fails.
    pub fn failing() -> Self {
        Self {
            replies: Replies::Fail,
            ..Self::echo()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failed_warm_up(mut self) -> Self {
        self.warm_up_ok = false;
        self
    }

    /// Block warm-up until the returned gate is opened.
    pub fn gated(mut self) -> (Self, WarmUpGate) {
        let semaphore = Arc::new(Semaphore::new(0));
        self.warm_up_gate = Some(semaphore.clone());
        (self, WarmUpGate(semaphore))
    }

    /// Reply produced for a user message.
    pub fn reply_for(text: &str) -> String {
        format!("Correction: {}", text)
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn warm_up(&self) -> Result<(), GenerationError> {
        if let Some(gate) = &self.warm_up_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| GenerationError::EngineError(e.to_string()))?;
        }
        if self.warm_up_ok {
            Ok(())
        } else {
            Err(GenerationError::EngineError("model failed to load".to_string()))
        }
    }

    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.histories.lock().unwrap().push(history.to_vec());

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies {
            Replies::Echo => {
                let last_user = history
                    .iter()
                    .rev()
                    .find(|turn| turn.role == Role::User)
                    .map(|turn| turn.content.as_str())
                    .unwrap_or_default();
                Ok(Self::reply_for(last_user))
            }
            Replies::Fail => Err(GenerationError::EngineError("out of memory".to_string())),
        }
    }
}
