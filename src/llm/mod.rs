//! The LLM capability.
//!
//! The rest of the crate talks to [`LlmBackend`] only; the provider adapter is
//! picked once, from configuration, by [`backend_from_config`].

mod anthropic;
mod openai;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{AiProvider, Config};
use crate::error::MedicError;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, MedicError>;
}

/// Build the configured provider's adapter.
pub fn backend_from_config(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn LlmBackend>, MedicError> {
    let provider = config.ai.provider;
    let key = config
        .credentials
        .ai_key(provider)
        .ok_or_else(|| MedicError::MissingConfig(provider.key_env_var().to_string()))?
        .to_string();
    let model = config.ai.effective_model().to_string();

    let backend: Box<dyn LlmBackend> = match provider {
        AiProvider::OpenAi => Box::new(OpenAiBackend::new(key, model, &config.ai, clock)?),
        AiProvider::Anthropic => Box::new(AnthropicBackend::new(key, model, &config.ai, clock)?),
    };

    tracing::debug!(backend = backend.name(), model = backend.model(), "selected LLM backend");
    Ok(backend)
}

/// Strip a surrounding ```json fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
