use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use relay_common::Turn;

use super::{GenerationError, InferenceGateway};

/// Inference gateway backed by an Ollama server.
pub struct OllamaGateway {
    http_client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// Ollama chat response format.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OllamaGateway {
    pub fn new(base_url: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }

    async fn chat(
        &self,
        messages: &[Turn],
        options: Option<OllamaOptions>,
    ) -> Result<OllamaChatResponse, GenerationError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options,
        };

        let url = format!("{}/api/chat", self.base_url);

        tracing::debug!("Sending {} turns to Ollama: {}", messages.len(), url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::EngineError(format!("{}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl InferenceGateway for OllamaGateway {
    /// An empty `messages` array makes Ollama load the model and return.
    async fn warm_up(&self) -> Result<(), GenerationError> {
        tracing::info!("Loading model {} from {}", self.model, self.base_url);
        self.chat(&[], None).await?;
        Ok(())
    }

    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError> {
        let response = self
            .chat(
                history,
                Some(OllamaOptions {
                    num_predict: self.max_tokens,
                }),
            )
            .await?;

        response
            .message
            .and_then(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}
