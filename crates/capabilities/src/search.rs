//! Web-search adapter.
//!
//! Two phases under one deadline: a keyword search against the search API,
//! then a single LLM pass that structures the raw results into 10–15
//! specific findings and 3–6 canonical sources. The adapter guarantees
//! non-empty findings on success and never falls back — the executor owns
//! recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use ds_domain::config::SearchConfig;
use ds_domain::run::canonical_url;
use ds_domain::CapabilityError;

use crate::traits::{
    ChatMessage, LlmCapability, LlmRequest, SearchCapability, SearchHarvest, WebSource,
};

const STRUCTURING_PROMPT: &str = "You turn raw web search results into research evidence. \
Respond with a JSON object: {\"summary\": string, \"findings\": [string], \
\"sources\": [{\"url\": string, \"title\": string}]}. \
Produce 10-15 specific findings. Each finding must be one complete sentence \
stating a concrete fact (names, numbers, dates where available). \
List 3-6 sources, each with its full canonical URL. \
Use only information present in the results; do not invent facts.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct KeywordSearchClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    llm: Arc<dyn LlmCapability>,
}

impl KeywordSearchClient {
    pub fn from_config(
        cfg: &SearchConfig,
        llm: Arc<dyn LlmCapability>,
    ) -> Result<Self, CapabilityError> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            llm,
        })
    }

    async fn keyword_search(
        &self,
        query: &str,
        deadline: Duration,
    ) -> Result<Vec<Value>, CapabilityError> {
        let url = format!("{}/search", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query }));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let outcome = tokio::time::timeout(deadline, async {
            let resp = builder
                .send()
                .await
                .map_err(|e| CapabilityError::Transport(e.to_string()))?;
            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| CapabilityError::Transport(e.to_string()))?;
            if !status.is_success() {
                return Err(CapabilityError::Upstream {
                    status: status.as_u16(),
                    message: text.chars().take(300).collect(),
                });
            }
            let json: Value = serde_json::from_str(&text)
                .map_err(|e| CapabilityError::Parse(e.to_string()))?;
            let results = json
                .get("results")
                .and_then(|r| r.as_array())
                .cloned()
                .ok_or_else(|| CapabilityError::Parse("no results array".into()))?;
            Ok(results)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(deadline)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structuring helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn results_digest(results: &[Value]) -> String {
    results
        .iter()
        .take(20)
        .map(|r| {
            let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = r.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
            format!("- {title} ({url}): {snippet}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse and normalize the LLM structuring reply. Findings are forced to
/// read as complete sentences; source URLs are canonicalized.
pub(crate) fn parse_harvest(raw: &str) -> Result<SearchHarvest, CapabilityError> {
    let json: Value =
        serde_json::from_str(raw).map_err(|e| CapabilityError::Parse(e.to_string()))?;

    let summary = json
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let findings: Vec<String> = json
        .get("findings")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|f| f.as_str())
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(as_sentence)
                .collect()
        })
        .unwrap_or_default();

    if findings.is_empty() {
        return Err(CapabilityError::Parse(
            "structuring pass produced no findings".into(),
        ));
    }

    let mut sources: Vec<WebSource> = Vec::new();
    if let Some(arr) = json.get("sources").and_then(|v| v.as_array()) {
        for s in arr {
            let Some(url) = s.get("url").and_then(|v| v.as_str()) else {
                continue;
            };
            let url = canonical_url(url);
            if url.is_empty() || sources.iter().any(|w| w.url == url) {
                continue;
            }
            sources.push(WebSource {
                url,
                title: s
                    .get("title")
                    .and_then(|v| v.as_str())
                    .map(|t| t.to_string()),
            });
        }
    }

    Ok(SearchHarvest {
        summary,
        findings,
        sources,
    })
}

fn as_sentence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl SearchCapability for KeywordSearchClient {
    async fn search(
        &self,
        query: &str,
        deadline: Duration,
    ) -> Result<SearchHarvest, CapabilityError> {
        let started = Instant::now();
        tracing::debug!(query = %query, "web search");

        let results = self.keyword_search(query, deadline).await?;
        if results.is_empty() {
            return Err(CapabilityError::Parse("search returned no results".into()));
        }

        // Spend whatever budget remains on the structuring pass.
        let remaining = deadline
            .checked_sub(started.elapsed())
            .ok_or(CapabilityError::Timeout(deadline))?;

        let messages = vec![
            ChatMessage::system(STRUCTURING_PROMPT),
            ChatMessage::user(format!(
                "Query: {query}\n\nSearch results:\n{}",
                results_digest(&results)
            )),
        ];
        let reply = self
            .llm
            .ask(LlmRequest::new(messages, remaining).expecting_json())
            .await?;

        parse_harvest(&reply.content)
    }
}
