//! LLM collaborator port (§6): `callLLM({systemPrompt, userMessage, agentId,
//! missionStepId?, forceTier}) -> {content, model, tier, usage, error?}`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::LlmError;
use crate::domain::models::ModelTier;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub agent_id: Option<Uuid>,
    pub mission_step_id: Option<Uuid>,
    pub tier: ModelTier,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tier: ModelTier,
    pub usage: LlmUsage,
}

/// The LLM provider, accessed through a tiered call interface with a
/// cost/usage contract. All usage must be persisted with a sanitized
/// `agent_id` by the caller (§4.6's agent-id sanitization rule), not by the
/// port implementation itself.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// No-op client substituted when no API key is configured; the core must
/// still function (§6) — every call degrades to an empty response rather
/// than failing the process.
pub struct NullLlmClient;

#[async_trait]
impl LlmClient for NullLlmClient {
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            content: String::new(),
            model: "null".to_string(),
            tier: request.tier,
            usage: LlmUsage::default(),
        })
    }
}
