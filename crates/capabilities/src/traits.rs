use std::time::Duration;

use serde::{Deserialize, Serialize};

use ds_domain::chart::{ChartKind, ChartPayload};
use ds_domain::CapabilityError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM request / reply types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One LLM synthesis request. The deadline is mandatory — there is no
/// default; callers own their time budget.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub deadline: Duration,
    /// When true, the adapter strips surrounding code fences from the
    /// reply. It never parses JSON itself — callers get raw text.
    pub expects_json: bool,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>, deadline: Duration) -> Self {
        Self {
            messages,
            temperature: None,
            deadline,
            expects_json: false,
        }
    }

    pub fn expecting_json(mut self) -> Self {
        self.expects_json = true;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmReply {
    pub content: String,
    pub tokens: Option<TokenUsage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Structured output of one web search: a short summary, specific
/// complete-sentence findings (non-empty on success), canonical sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHarvest {
    pub summary: String,
    pub findings: Vec<String>,
    pub sources: Vec<WebSource>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chart types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartImage {
    pub image_url: String,
    pub chart_kind: ChartKind,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// LLM synthesis. Implementations select endpoint and model internally;
/// callers never see either.
#[async_trait::async_trait]
pub trait LlmCapability: Send + Sync {
    async fn ask(&self, req: LlmRequest) -> Result<LlmReply, CapabilityError>;
}

/// Web search with LLM structuring into findings + sources.
#[async_trait::async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, query: &str, deadline: Duration)
        -> Result<SearchHarvest, CapabilityError>;
}

/// Chart rendering. The payload is shape-validated before the remote call.
#[async_trait::async_trait]
pub trait ChartCapability: Send + Sync {
    async fn render(
        &self,
        kind: ChartKind,
        payload: ChartPayload,
        deadline: Duration,
    ) -> Result<ChartImage, CapabilityError>;
}
