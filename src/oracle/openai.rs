//! OpenAI-compatible chat-completions providers.
//!
//! Three deployments share one wire format and differ in URL, auth header
//! and whether the model and sampling parameters travel in the body.

use serde_json::{Value, json};

use crate::config::OracleConfig;

use super::{Message, OracleError, OracleResult, TextOracle, agent, post_json, require};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o";
const AZURE_INFERENCE_API_VERSION: &str = "2024-05-01-preview";

/// Sampling parameters sent with each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Client for one chat-completions deployment.
pub struct ChatCompletionsClient {
    label: String,
    url: String,
    auth_header: &'static str,
    auth_value: String,
    model: Option<String>,
    sampling: Option<Sampling>,
    timeout_secs: u64,
    agent: ureq::Agent,
}

impl ChatCompletionsClient {
    /// Azure OpenAI deployment (`gpt-35-turbo` and the fallback).
    pub fn azure_openai(
        config: &OracleConfig,
        env: &impl Fn(&str) -> Option<String>,
    ) -> OracleResult<Self> {
        let endpoint = require(env, "AZURE_OPENAI_ENDPOINT")?;
        let key = require(env, "AZURE_OPENAI_API_KEY")?;
        let version = require(env, "AZURE_OPENAI_API_VERSION")?;
        let deployment = require(env, "AZURE_OPENAI_MODEL_NAME")?;
        Ok(Self {
            label: format!("azure-openai:{deployment}"),
            url: format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={version}",
                endpoint.trim_end_matches('/')
            ),
            auth_header: "api-key",
            auth_value: key,
            model: None,
            sampling: None,
            timeout_secs: config.timeout_secs,
            agent: agent(config.timeout_secs),
        })
    }

    /// Azure AI inference endpoint (`gpt-4o`).
    pub fn azure_inference(
        config: &OracleConfig,
        env: &impl Fn(&str) -> Option<String>,
    ) -> OracleResult<Self> {
        let endpoint = require(env, "AZURE_OPENAI_ENDPOINT_4o")?;
        let key = require(env, "AZURE_OPENAI_API_KEY_4o")?;
        let model = require(env, "AZURE_OPENAI_MODEL_NAME_4o")?;
        Ok(Self {
            label: format!("azure-inference:{model}"),
            url: format!(
                "{}/chat/completions?api-version={AZURE_INFERENCE_API_VERSION}",
                endpoint.trim_end_matches('/')
            ),
            auth_header: "api-key",
            auth_value: key,
            model: Some(model),
            sampling: Some(Sampling {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                top_p: config.top_p,
            }),
            timeout_secs: config.timeout_secs,
            agent: agent(config.timeout_secs),
        })
    }

    /// OpenAI public API.
    pub fn openai(config: &OracleConfig, env: &impl Fn(&str) -> Option<String>) -> OracleResult<Self> {
        let key = require(env, "OPENAI_API_KEY")?;
        Ok(Self {
            label: format!("openai:{OPENAI_MODEL}"),
            url: OPENAI_URL.into(),
            auth_header: "Authorization",
            auth_value: format!("Bearer {key}"),
            model: Some(OPENAI_MODEL.into()),
            sampling: None,
            timeout_secs: config.timeout_secs,
            agent: agent(config.timeout_secs),
        })
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let mut body = json!({ "messages": messages });
        if let Some(model) = &self.model {
            body["model"] = json!(model);
        }
        if let Some(sampling) = &self.sampling {
            body["max_tokens"] = json!(sampling.max_tokens);
            body["temperature"] = json!(sampling.temperature);
            body["top_p"] = json!(sampling.top_p);
        }
        body
    }
}

impl TextOracle for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete(&self, messages: &[Message]) -> OracleResult<String> {
        let body = self.request_body(messages);
        let json = post_json(
            &self.agent,
            &self.url,
            &[(self.auth_header, self.auth_value.as_str())],
            &body,
            self.timeout_secs,
        )?;
        parse_completion(&json)
    }
}

/// The trimmed content of the first choice.
pub fn parse_completion(json: &Value) -> OracleResult<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| OracleError::ParseError {
            message: "missing 'choices[0].message.content' field".into(),
        })
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("label", &self.label)
            .field("url", &self.url.split('?').next().unwrap_or_default())
            .field("sampling", &self.sampling)
            .finish()
    }
}
