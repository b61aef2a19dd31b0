//! Anthropic adapter (message classification).
//!
//! Uses the Messages API with a single user turn and returns the text of the
//! first content block. No retries: a failed call is the caller's cue to fall
//! back to rule-based classification.

use async_trait::async_trait;
use serde_json::json;

use kb_core::{config::ClassifierConfig, errors::Error, ports::CompletionClient, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct AnthropicClient {
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl AnthropicClient {
    /// `None` when no API key is configured.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("anthropic client build error: {e}")))?;
        Ok(Some(Self {
            api_key,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            http,
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| Error::External(format!("anthropic request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "anthropic classification failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("anthropic json error: {e}")))?;

        let text = v
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        if text.trim().is_empty() {
            return Err(Error::External(
                "anthropic reply had no text content".to_string(),
            ));
        }

        Ok(text)
    }
}
