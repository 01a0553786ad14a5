use super::{GenerateError, ModelParams, TextGenerator};
use crate::types::{EnricherError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MISTRAL_API_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API, without the endpoint path.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: MISTRAL_API_URL.to_string(),
            api_key_env: "MISTRAL_API_KEY".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Text generator speaking the `/chat/completions` protocol
pub struct ChatCompletionsProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletionsProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EnricherError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(
            &config.base_url,
            &api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

/// Map a non-success HTTP status to a generation failure kind.
pub fn classify_status(status: StatusCode, body: &str) -> GenerateError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerateError::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        GenerateError::Transient(detail)
    } else {
        GenerateError::Fatal(detail)
    }
}

fn classify_transport(err: reqwest::Error) -> GenerateError {
    if err.is_builder() || err.is_redirect() {
        GenerateError::Fatal(err.to_string())
    } else {
        GenerateError::Transient(err.to_string())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> std::result::Result<String, GenerateError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &params.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        debug!("Chat completion request to {} (model {})", url, params.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response.text().await.map_err(classify_transport)?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GenerateError::Fatal(format!("malformed completion body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerateError::Fatal("completion has no content".to_string()))
    }
}
