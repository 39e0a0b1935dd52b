//! OpenAI-compatible HTTP client.
//!
//! [`OpenAiClient`] implements both [`Embedder`] (`POST {base_url}/embeddings`)
//! and [`Completer`] (`POST {base_url}/chat/completions`). The base URL is
//! configurable, so any OpenAI-compatible gateway works.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - HTTP 4xx (other): fail immediately
//! - Network errors: retry
//!
//! Backoff is exponential: 1s, 2s, 4s, ... capped at 32s, for at most
//! `max_retries` retries.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use ragbot_core::completion::{Completer, CompletionOptions, Message};
use ragbot_core::embedding::Embedder;

use crate::config::OpenAiConfig;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    /// `None` when the key variable is unset; requests then fail without
    /// touching the network.
    api_key: Option<String>,
    api_key_env: String,
    embedding_model: String,
    dims: usize,
    chat_model: String,
    max_retries: u32,
}

impl OpenAiClient {
    /// Build a client, reading the API key from the environment variable
    /// named by `config.api_key_env`.
    ///
    /// A missing key is not an error here: commands that never call OpenAI
    /// (listing or deleting sources) must work without one. The first
    /// request reports it instead.
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "OpenAI API key not set; embedding and chat requests will fail"
            );
        }
        Self::build(config, api_key)
    }

    pub fn with_api_key(config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::build(config, Some(api_key.into()))
    }

    fn build(config: &OpenAiConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            embedding_model: config.embedding_model.clone(),
            dims: config.embedding_dims,
            chat_model: config.chat_model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} environment variable not set", self.api_key_env))?;
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(%url, attempt, ?delay, "retrying OpenAI request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .context("Invalid OpenAI response: body is not JSON");
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%url, %status, attempt, "OpenAI request failed, will retry");
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "OpenAI request failed, will retry");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("OpenAI request failed after retries")))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let json = self.post_json("/embeddings", &body).await?;
        parse_embedding_response(&json)
    }
}

#[async_trait]
impl Completer for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        let json = self.post_json("/chat/completions", &body).await?;
        parse_completion_response(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings response.
fn parse_embedding_response(json: &Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid OpenAI response: non-numeric embedding value"))
        })
        .collect()
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_completion_response(json: &Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embedding() {
        let json = json!({ "data": [{ "index": 0, "embedding": [0.5, -1.0, 2] }] });
        assert_eq!(parse_embedding_response(&json).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn embedding_without_data_is_an_error() {
        assert!(parse_embedding_response(&json!({ "error": "nope" })).is_err());
        assert!(parse_embedding_response(&json!({ "data": [] })).is_err());
        assert!(parse_embedding_response(&json!({ "data": [{ "embedding": ["x"] }] })).is_err());
    }

    #[test]
    fn parses_completion_and_trims() {
        let json = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "  Hello [1]\n" } }]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "Hello [1]");
    }

    #[test]
    fn completion_without_content_is_an_error() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": null } }] });
        assert!(parse_completion_response(&json).is_err());
    }

    #[tokio::test]
    async fn missing_api_key_fails_on_first_request() {
        let config = OpenAiConfig {
            api_key_env: "RAGBOT_TEST_DEFINITELY_UNSET_KEY".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            ..OpenAiConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();
        assert!(client.api_key.is_none());

        let err = client.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("RAGBOT_TEST_DEFINITELY_UNSET_KEY"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = OpenAiConfig {
            base_url: "http://localhost:9999/v1/".to_string(),
            ..OpenAiConfig::default()
        };
        let client = OpenAiClient::with_api_key(&config, "k").unwrap();
        assert_eq!(client.base_url, "http://localhost:9999/v1");
    }
}
