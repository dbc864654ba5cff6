//! Anthropic Messages API adapter.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{LlmBackend, LlmRequest, LlmResponse};
use crate::clock::Clock;
use crate::config::AiConfig;
use crate::error::MedicError;
use crate::http::{check_status, create_http_client, send_with_retry};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const SERVICE: &str = "anthropic";

pub struct AnthropicBackend {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    clock: Arc<dyn Clock>,
}

impl AnthropicBackend {
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
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
            api_key,
            model,
            max_tokens: config.max_tokens,
            clock,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

fn response_text(response: MessagesResponse) -> LlmResponse {
    let content = response
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    LlmResponse {
        content,
        model: response.model,
        input_tokens: response.usage.as_ref().map(|u| u.input_tokens),
        output_tokens: response.usage.as_ref().map(|u| u.output_tokens),
    }
}

impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, MedicError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: request.system_prompt.as_deref(),
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        tracing::debug!(
            model = %self.model,
            prompt_len = request.prompt.len(),
            "invoking Anthropic Messages API"
        );

        let builder = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response = check_status(
            send_with_retry(builder, SERVICE, self.clock.as_ref())?,
            SERVICE,
        )?;
        let parsed: MessagesResponse = response.json().map_err(|e| MedicError::Api {
            service: SERVICE.to_string(),
            status: 200,
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(response_text(parsed))
    }
}
