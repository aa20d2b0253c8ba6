//! Text-completion oracles.
//!
//! The pipeline only ever asks one thing of a language model: given an
//! ordered list of role-tagged messages, return a single completion. That
//! capability is [`TextOracle`]. Concrete providers are chosen once at
//! startup by [`from_config`], keyed on `oracle.model_name`:
//!
//! | model name          | provider                                  |
//! |---------------------|-------------------------------------------|
//! | `gpt-35-turbo`      | Azure OpenAI deployment                   |
//! | `gpt-4o`            | Azure AI inference endpoint               |
//! | `openai`            | OpenAI public API (`gpt-4o`)              |
//! | `ollama[:<model>]`  | local Ollama server                       |
//! | anything else       | Azure OpenAI deployment                   |

pub mod ollama;
pub mod openai;
pub mod scripted;

use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OracleConfig;

/// Errors from the oracle subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("oracle is not available at {url}")]
    #[diagnostic(
        code(askgraph::oracle::unavailable),
        help("Check the endpoint URL and your network connection. For Ollama, start it with `ollama serve`.")
    )]
    Unavailable { url: String },

    #[error("oracle request failed: {message}")]
    #[diagnostic(
        code(askgraph::oracle::request_failed),
        help("Check the credentials, the deployment or model name and the API version.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse oracle response: {message}")]
    #[diagnostic(
        code(askgraph::oracle::parse_error),
        help("The provider returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("oracle request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(askgraph::oracle::timeout),
        help("Increase `oracle.timeout_secs` or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("missing credential: {var} is not set")]
    #[diagnostic(
        code(askgraph::oracle::missing_credential),
        help("Export {var} in the environment. Provider credentials are never read from the config file.")
    )]
    MissingCredential { var: String },

    #[error("scripted oracle has no response left for call {call}")]
    #[diagnostic(
        code(askgraph::oracle::script_exhausted),
        help("Add more responses to the script.")
    )]
    ScriptExhausted { call: usize },
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A black-box text-completion service.
pub trait TextOracle {
    /// Short provider description, for logs.
    fn name(&self) -> &str;

    /// Complete a conversation. The returned text is trimmed.
    fn complete(&self, messages: &[Message]) -> OracleResult<String>;
}

/// Provider selected by a model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    AzureOpenAi,
    AzureInference,
    OpenAi,
    Ollama { model: Option<String> },
}

impl Provider {
    /// Case-insensitive lookup. Unknown names fall back to Azure OpenAI.
    pub fn from_model_name(name: &str) -> Self {
        let trimmed = name.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "gpt-35-turbo" => Self::AzureOpenAi,
            "gpt-4o" => Self::AzureInference,
            "openai" => Self::OpenAi,
            "ollama" => Self::Ollama { model: None },
            _ if lower.starts_with("ollama:") => Self::Ollama {
                model: Some(trimmed["ollama:".len()..].to_string()).filter(|m| !m.is_empty()),
            },
            _ => Self::AzureOpenAi,
        }
    }
}

/// Build the oracle named by `config.model_name`, reading credentials through `env`.
pub fn from_config(
    config: &OracleConfig,
    env: impl Fn(&str) -> Option<String>,
) -> OracleResult<Box<dyn TextOracle>> {
    let provider = Provider::from_model_name(&config.model_name);
    let oracle: Box<dyn TextOracle> = match &provider {
        Provider::AzureOpenAi => Box::new(openai::ChatCompletionsClient::azure_openai(config, &env)?),
        Provider::AzureInference => {
            Box::new(openai::ChatCompletionsClient::azure_inference(config, &env)?)
        }
        Provider::OpenAi => Box::new(openai::ChatCompletionsClient::openai(config, &env)?),
        Provider::Ollama { model } => Box::new(ollama::OllamaClient::new(ollama::OllamaConfig {
            base_url: config.ollama_url.clone(),
            model: model.clone().unwrap_or_else(|| ollama::DEFAULT_MODEL.into()),
            timeout_secs: config.timeout_secs,
        })),
    };
    tracing::info!(model = %config.model_name, oracle = oracle.name(), "selected oracle");
    Ok(oracle)
}

/// Look up a required environment variable.
pub(crate) fn require(env: &impl Fn(&str) -> Option<String>, var: &str) -> OracleResult<String> {
    env(var).ok_or_else(|| OracleError::MissingCredential { var: var.into() })
}

pub(crate) fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// POST a JSON body and parse the JSON reply, mapping transport failures.
pub(crate) fn post_json(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    timeout_secs: u64,
) -> OracleResult<serde_json::Value> {
    let body_str = serde_json::to_string(body).map_err(|e| OracleError::RequestFailed {
        message: format!("JSON serialize error: {e}"),
    })?;

    let mut request = agent.post(url).set("Content-Type", "application/json");
    for (name, value) in headers {
        request = request.set(name, value);
    }

    let resp = request.send_string(&body_str).map_err(|e| match e {
        ureq::Error::Status(code, resp) => OracleError::RequestFailed {
            message: format!(
                "server returned status {code}: {}",
                resp.into_string().unwrap_or_default()
            ),
        },
        ureq::Error::Transport(t) => match t.kind() {
            ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => OracleError::Unavailable {
                url: display_url(url),
            },
            ureq::ErrorKind::Io if t.to_string().contains("timed out") => {
                OracleError::Timeout { timeout_secs }
            }
            _ => OracleError::RequestFailed {
                message: t.to_string(),
            },
        },
    })?;

    let resp_str = resp.into_string().map_err(|e| OracleError::ParseError {
        message: e.to_string(),
    })?;
    serde_json::from_str(&resp_str).map_err(|e| OracleError::ParseError {
        message: e.to_string(),
    })
}

/// URL without its query string, which may carry an API version or key.
fn display_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}
