//! Web crawling seam used by URL ingestion.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text extracted from one web page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledPage {
    /// The URL that was fetched.
    pub url: String,
    pub title: Option<String>,
    /// Extracted page content, markdown where the service provides it.
    pub content: String,
}

#[async_trait]
pub trait Crawler: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<CrawledPage>;
}
