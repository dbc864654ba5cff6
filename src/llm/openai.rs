//! OpenAI chat completions adapter. Also works against compatible endpoints
//! through `ai.base_url`.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{LlmBackend, LlmRequest, LlmResponse};
use crate::clock::Clock;
use crate::config::AiConfig;
use crate::error::MedicError;
use crate::http::{check_status, create_http_client, send_with_retry};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const SERVICE: &str = "openai";
const DEFAULT_TEMPERATURE: f32 = 0.3;

pub struct OpenAiBackend {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    clock: Arc<dyn Clock>,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        model: String,
        config: &AiConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MedicError> {
        Ok(Self {
            client: create_http_client(Duration::from_secs(config.request_timeout_secs))?,
            api_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
            api_key,
            model,
            max_tokens: config.max_tokens,
            clock,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn build_messages(request: &LlmRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, MedicError> {
        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(request),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        tracing::debug!(
            model = %self.model,
            prompt_len = request.prompt.len(),
            "invoking chat completions API"
        );

        let builder = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = check_status(
            send_with_retry(builder, SERVICE, self.clock.as_ref())?,
            SERVICE,
        )?;
        let parsed: ChatResponse = response.json().map_err(|e| MedicError::Api {
            service: SERVICE.to_string(),
            status: 200,
            message: format!("failed to parse response: {e}"),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: parsed.model,
            input_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens),
        })
    }
}
