//! Chart-render adapter.
//!
//! Validates the typed payload shape before any network call, then posts
//! it to the external render service and returns the image URL.

use std::time::Duration;

use serde_json::Value;

use ds_domain::chart::{ChartKind, ChartPayload};
use ds_domain::config::ChartConfig;
use ds_domain::CapabilityError;

use crate::traits::{ChartCapability, ChartImage};

pub struct ChartServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChartServiceClient {
    pub fn from_config(cfg: &ChartConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn parse_image_url(body: &Value) -> Option<String> {
    body.get("imageUrl")
        .or_else(|| body.get("url"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[async_trait::async_trait]
impl ChartCapability for ChartServiceClient {
    async fn render(
        &self,
        kind: ChartKind,
        payload: ChartPayload,
        deadline: Duration,
    ) -> Result<ChartImage, CapabilityError> {
        payload
            .validate_for(kind)
            .map_err(CapabilityError::InvalidPayload)?;

        let url = format!("{}/render", self.base_url);
        let body = serde_json::json!({ "chartKind": kind, "payload": payload });

        tracing::debug!(kind = %kind, "chart render");

        let outcome = tokio::time::timeout(deadline, async {
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| CapabilityError::Transport(e.to_string()))?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| CapabilityError::Transport(e.to_string()))?;

            if !status.is_success() {
                return Err(CapabilityError::Render(format!(
                    "render service returned HTTP {}: {}",
                    status.as_u16(),
                    text.chars().take(200).collect::<String>()
                )));
            }

            let json: Value = serde_json::from_str(&text)
                .map_err(|e| CapabilityError::Parse(e.to_string()))?;
            let image_url = parse_image_url(&json)
                .ok_or_else(|| CapabilityError::Parse("no imageUrl in render reply".into()))?;
            Ok(ChartImage {
                image_url,
                chart_kind: kind,
            })
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_domain::chart::sample_payload;

    #[tokio::test]
    async fn mismatched_payload_rejected_before_network() {
        // Points to a non-routable port; validation must fail first.
        let client = ChartServiceClient {
            base_url: "http://127.0.0.1:1".into(),
            client: reqwest::Client::new(),
        };
        let err = client
            .render(
                ChartKind::Line,
                sample_payload(ChartKind::Pie),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidPayload(_)));
    }

    #[test]
    fn parse_image_url_accepts_both_keys() {
        assert_eq!(
            parse_image_url(&serde_json::json!({"imageUrl": "https://a/img.png"})),
            Some("https://a/img.png".into())
        );
        assert_eq!(
            parse_image_url(&serde_json::json!({"url": "https://b/img.png"})),
            Some("https://b/img.png".into())
        );
        assert_eq!(parse_image_url(&serde_json::json!({})), None);
    }
}
