//! Shared application state.
//!
//! [`Services`] bundles configuration with every backend behind its trait
//! object, so the HTTP handlers, the CLI, and tests all drive the same
//! ingestion and chat code.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use ragbot_core::completion::Completer;
use ragbot_core::crawl::Crawler;
use ragbot_core::embedding::Embedder;
use ragbot_core::rate_limit::RateLimiter;
use ragbot_core::store::Store;
use ragbot_core::ttl::{MemoryTtlStore, TtlStore};

use crate::config::Config;
use crate::crawler::HttpCrawler;
use crate::openai::OpenAiClient;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

pub struct Services {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
    pub crawler: Arc<dyn Crawler>,
    /// Answer cache.
    pub cache: Arc<dyn TtlStore>,
    pub rate_limiter: RateLimiter,
}

impl Services {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        crawler: Arc<dyn Crawler>,
        ttl: Arc<dyn TtlStore>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            ttl.clone(),
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        );
        Self {
            config,
            store,
            embedder,
            completer,
            crawler,
            cache: ttl,
            rate_limiter,
        }
    }

    /// Production wiring: SQLite store (migrated), OpenAI for embeddings and
    /// completions, the HTTP crawler, and an in-process TTL store.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let openai = Arc::new(OpenAiClient::new(&config.openai)?);
        let crawler = Arc::new(HttpCrawler::new(&config.crawler)?);
        info!(
            db = %config.db.path.display(),
            embedding_model = %config.openai.embedding_model,
            chat_model = %config.openai.chat_model,
            "services initialised"
        );

        Ok(Self::new(
            config,
            Arc::new(SqliteStore::new(pool)),
            openai.clone(),
            openai,
            crawler,
            Arc::new(MemoryTtlStore::new()),
        ))
    }
}
