//! Ollama client for running the pipeline against a local model.

use serde_json::{Value, json};

use super::{Message, OracleError, OracleResult, TextOracle, agent, post_json};

/// Model used for a bare `ollama` model name.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: DEFAULT_MODEL.into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the Ollama chat API.
pub struct OllamaClient {
    config: OllamaConfig,
    label: String,
    agent: ureq::Agent,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            label: format!("ollama:{}", config.model),
            agent: agent(config.timeout_secs),
            config,
        }
    }

    /// Get the model name being used.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        })
    }
}

impl TextOracle for OllamaClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete(&self, messages: &[Message]) -> OracleResult<String> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let json = post_json(
            &self.agent,
            &url,
            &[],
            &self.request_body(messages),
            self.config.timeout_secs,
        )?;
        parse_chat(&json)
    }
}

/// The trimmed `message.content` of a non-streaming chat reply.
pub fn parse_chat(json: &Value) -> OracleResult<String> {
    json["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| OracleError::ParseError {
            message: "missing 'message.content' field".into(),
        })
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
