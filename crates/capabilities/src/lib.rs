//! Typed adapters for the three external capabilities: LLM synthesis,
//! web search, and chart rendering.
//!
//! Every call takes a mandatory deadline. Adapters surface a typed
//! [`ds_domain::CapabilityError`] and never run fallback logic — recovery
//! policy belongs to the executor.

pub mod chart;
pub mod llm;
pub mod search;
pub mod traits;

pub use chart::ChartServiceClient;
pub use llm::OpenAiCompatLlm;
pub use search::KeywordSearchClient;
pub use traits::{
    ChartCapability, ChartImage, ChatMessage, ChatRole, LlmCapability, LlmReply, LlmRequest,
    SearchCapability, SearchHarvest, TokenUsage, WebSource,
};
