//! OpenAI-compatible LLM adapter.
//!
//! Works with any endpoint that follows the chat completions contract.
//! The caller never sees model names or endpoints; both come from config.

use std::time::Duration;

use serde_json::Value;

use ds_domain::config::LlmConfig;
use ds_domain::CapabilityError;

use crate::traits::{ChatMessage, ChatRole, LlmCapability, LlmReply, LlmRequest, TokenUsage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatLlm {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatLlm {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, CapabilityError> {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            client,
        })
    }

    fn build_body(&self, req: &LlmRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if req.expects_json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_wire(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

fn parse_reply(body: &Value) -> Result<LlmReply, CapabilityError> {
    let content = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| CapabilityError::Parse("no message content in response".into()))?
        .to_string();

    let tokens = body.get("usage").and_then(parse_usage);

    Ok(LlmReply { content, tokens })
}

fn parse_usage(v: &Value) -> Option<TokenUsage> {
    Some(TokenUsage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

/// Strip one surrounding Markdown code fence (``` or ```json) if present.
/// Models wrap JSON replies in fences even when told not to.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// Map a reqwest failure to the capability taxonomy.
fn from_reqwest(deadline: Duration) -> impl Fn(reqwest::Error) -> CapabilityError {
    move |e| {
        if e.is_timeout() {
            CapabilityError::Timeout(deadline)
        } else {
            CapabilityError::Transport(e.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmCapability for OpenAiCompatLlm {
    async fn ask(&self, req: LlmRequest) -> Result<LlmReply, CapabilityError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);
        let deadline = req.deadline;

        tracing::debug!(url = %url, deadline_ms = deadline.as_millis() as u64, "llm request");

        // The whole round-trip (connect, send, read body) runs under the
        // deadline. A blown deadline drops the in-flight future.
        let outcome = tokio::time::timeout(deadline, async {
            let resp = self
                .authed_post(&url)
                .json(&body)
                .send()
                .await
                .map_err(from_reqwest(deadline))?;

            let status = resp.status();
            let text = resp.text().await.map_err(from_reqwest(deadline))?;

            if !status.is_success() {
                return Err(CapabilityError::Upstream {
                    status: status.as_u16(),
                    message: truncate(&text, 300),
                });
            }

            let json: Value = serde_json::from_str(&text)
                .map_err(|e| CapabilityError::Parse(e.to_string()))?;
            parse_reply(&json)
        })
        .await;

        let mut reply = match outcome {
            Ok(result) => result?,
            Err(_) => return Err(CapabilityError::Timeout(deadline)),
        };

        if req.expects_json {
            reply.content = strip_code_fences(&reply.content).to_string();
        }
        Ok(reply)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("hello"), "hello");
        assert_eq!(strip_code_fences("  hello  "), "hello");
    }

    #[test]
    fn strip_fences_json_fence() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_bare_fence() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strip_fences_unterminated_left_alone() {
        let fenced = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(fenced), fenced.trim());
    }

    #[test]
    fn parse_reply_extracts_content_and_usage() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "result text" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let reply = parse_reply(&body).unwrap();
        assert_eq!(reply.content, "result text");
        assert_eq!(reply.tokens.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_reply_missing_content_is_parse_error() {
        let body = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_reply(&body),
            Err(CapabilityError::Parse(_))
        ));
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        assert_eq!(truncate("héllo", 2), "h...");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
