//! [`CompletionService`] backed by an OpenAI-compatible `/chat/completions`
//! endpoint, OpenRouter by default.
//!
//! The client makes exactly one HTTP request per call. Retrying is left to the
//! council's [`RetryPolicy`](crate::retry::RetryPolicy), so this module only has to
//! classify failures:
//!
//! | Condition                                   | Classification     |
//! |---------------------------------------------|--------------------|
//! | HTTP 429, 408, any 5xx, connect/timeout     | `RateLimited`      |
//! | Any other non-success status, bad JSON body | `PermanentFailure` |

use crate::clients::http_pool::get_http_client;
use crate::completion::{Completion, CompletionRequest, CompletionService, TokenUsage};
use crate::config::{ProviderConfig, OPENROUTER_BASE_URL};
use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

impl OpenRouterClient {
    pub fn new(api_key: &str) -> Self {
        Self::new_with_base_url(api_key, OPENROUTER_BASE_URL)
    }

    pub fn new_with_base_url(api_key: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            api_key: api_key.to_string(),
            client: get_http_client(&base_url),
            base_url,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new_with_base_url(&config.openrouter_api_key, &config.openrouter_base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16, body: &str) -> UpstreamError {
    let message = format!("HTTP {}: {}", status, body.trim());
    match status {
        408 | 429 | 500..=599 => UpstreamError::RateLimited(message),
        _ => UpstreamError::PermanentFailure(message),
    }
}

fn classify_transport(err: &reqwest::Error) -> UpstreamError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        UpstreamError::RateLimited(format!("transport error: {}", err))
    } else {
        UpstreamError::PermanentFailure(format!("transport error: {}", err))
    }
}

/// Extract the assistant text and usage from a response body.
pub fn parse_chat_response(body: &str) -> Result<Completion, UpstreamError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        UpstreamError::PermanentFailure(format!("malformed completion response: {}", e))
    })?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| UpstreamError::PermanentFailure("completion response had no content".into()))?;
    Ok(Completion {
        content,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let payload = json!({
            "model": request.model_id,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                log::error!("OpenRouterClient::complete({}): {}", request.model_id, e);
                classify_transport(&e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&e))?;
        if !status.is_success() {
            log::error!(
                "OpenRouterClient::complete({}): HTTP {}",
                request.model_id,
                status.as_u16()
            );
            return Err(classify_status(status.as_u16(), &body));
        }
        parse_chat_response(&body)
    }
}
