use serde::{Deserialize, Serialize};

/// Body of a non-streaming Ollama `/api/chat` reply.
#[derive(Debug, Serialize, Deserialize)]
pub struct MockOllamaResponse {
    pub model: String,
    #[serde(default)]
    pub message: Option<MockOllamaMessage>,
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MockOllamaMessage {
    pub role: String,
    pub content: String,
}

impl MockOllamaResponse {
    pub fn simple_text(content: &str) -> Self {
        Self {
            model: "llama3.2:1b".to_string(),
            message: Some(MockOllamaMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            }),
            done: true,
            done_reason: Some("stop".to_string()),
            prompt_eval_count: Some(10),
            eval_count: Some(content.split_whitespace().count() as u32),
        }
    }

    /// Reply to an empty `messages` request: the model is loaded, nothing is
    /// generated.
    pub fn load_ack() -> Self {
        Self {
            model: "llama3.2:1b".to_string(),
            message: Some(MockOllamaMessage {
                role: "assistant".to_string(),
                content: String::new(),
            }),
            done: true,
            done_reason: Some("load".to_string()),
            prompt_eval_count: None,
            eval_count: None,
        }
    }

    pub fn error_json(message: &str) -> serde_json::Value {
        serde_json::json!({
            "error": message
        })
    }
}
