//! Remote text generation and the stages built on it.

pub mod client;
pub mod prompts;
pub mod provider;
pub mod stages;

pub use client::{ClientStats, RateLimitConfig, RateLimitedClient};
pub use prompts::PromptTemplates;
pub use provider::{ChatCompletionsProvider, ProviderConfig};
pub use stages::{
    AiTitleStage, CategorizationStage, Detection, EnrichmentStage, LanguageDetector, StageContext,
    StageError, SummarizationStage, TranslationStage, WhatlangDetector,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure kinds a generator can report. Only the first two are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerateError::RateLimited | GenerateError::Transient(_))
    }
}

/// Model parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "mistral-small-latest".to_string(),
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

/// A remote text generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> std::result::Result<String, GenerateError>;
}
