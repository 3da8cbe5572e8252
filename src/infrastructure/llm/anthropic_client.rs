//! HTTP client for the Anthropic Messages API, grounded on the teacher's
//! `infrastructure/claude/client.rs`.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::error::LlmError;
use crate::domain::ports::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use super::tier_map::model_name;

pub struct AnthropicClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub rate_limit_rps: f64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for AnthropicClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            rate_limit_rps: 4.0,
            max_retries: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 300_000,
            timeout_secs: 300,
            max_tokens: 4096,
        }
    }
}

pub struct AnthropicClient {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(config: AnthropicClientConfig) -> Result<Self, LlmError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            max_tokens: config.max_tokens,
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rps),
            retry_policy: RetryPolicy::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms),
        })
    }

    async fn send(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(300)
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        429 => LlmError::RateLimitExceeded,
        500 | 502 | 503 | 504 | 529 => LlmError::RequestFailed(format!("server error {status}: {body}")),
        _ => LlmError::InvalidResponse(format!("status {status}: {body}")),
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let wire_request = MessageRequest {
            model: model_name(request.tier).to_string(),
            system: Some(request.system_prompt.clone()),
            messages: vec![Message { role: "user".to_string(), content: request.user_message.clone() }],
            max_tokens: self.max_tokens,
        };

        self.rate_limiter.acquire().await;

        let response = self
            .retry_policy
            .execute(|| self.send(&wire_request))
            .await?;

        let content = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LlmResponse {
            content,
            model: response.model,
            tier: request.tier,
            usage: LlmUsage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct MessageRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_retry_policy() {
        assert!(matches!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()), LlmError::RateLimitExceeded));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn client_construction_succeeds_with_defaults() {
        let client = AnthropicClient::new(AnthropicClientConfig { api_key: "test".to_string(), ..Default::default() });
        assert!(client.is_ok());
    }
}
