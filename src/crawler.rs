//! HTTP client for a hosted scraping service.
//!
//! Sends `POST {endpoint}` with `{ "url": ..., "formats": ["markdown"] }` and
//! reads the page markdown from `data.markdown`, falling back to top-level
//! `markdown`, `content`, or `text`. The title comes from
//! `data.metadata.title` when present.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use ragbot_core::crawl::{CrawledPage, Crawler};

use crate::config::CrawlerConfig;

pub struct HttpCrawler {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCrawler {
    /// The API key is optional: a self-hosted crawler may not need one.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn fetch(&self, url: &str) -> Result<CrawledPage> {
        debug!(url, endpoint = %self.endpoint, "crawling page");
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "url": url, "formats": ["markdown"] }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Crawler request failed for {}", url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Crawler error {} for {}: {}", status, url, body);
        }

        let json: Value = response
            .json()
            .await
            .context("Invalid crawler response: body is not JSON")?;
        parse_crawl_response(url, &json)
    }
}

fn parse_crawl_response(url: &str, json: &Value) -> Result<CrawledPage> {
    let data = json.get("data").unwrap_or(json);
    let content = ["markdown", "content", "text"]
        .iter()
        .find_map(|field| data.get(*field).or_else(|| json.get(*field)))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Invalid crawler response: no page content for {}", url))?;

    let title = data
        .get("metadata")
        .and_then(|m| m.get("title"))
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(CrawledPage {
        url: url.to_string(),
        title,
        content: content.to_string(),
    })
}
