//! TOML configuration.
//!
//! Every section except `[server]` and `[db]` has defaults, so a minimal
//! file is:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8787"
//!
//! [db]
//! path = "./data/ragbot.sqlite"
//! ```
//!
//! Secrets are never stored in the file: `[openai].api_key_env` and
//! `[crawler].api_key_env` name the environment variables to read.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Origins allowed by CORS. `["*"]` allows any origin, which the
    /// embeddable widget needs.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Largest accepted request body, in bytes (file uploads).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Rate-limit chat by the first `X-Forwarded-For` address instead of
    /// the peer IP. Enable only behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_openai_key_env(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    ragbot_core::models::EMBEDDING_DIMS
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk. `0` stores each input as one chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    200
}
fn default_overlap() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Chunks scoring below this are left out of the prompt.
    #[serde(default)]
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_similarity: 0.0,
        }
    }
}

fn default_top_n() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Most recent history turns sent to the model.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Lifetime of cached answers to history-free questions. `0` disables the cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_history: default_max_history(),
            max_message_chars: default_max_message_chars(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ChatConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant for this website. Answer visitors' questions \
     concisely and politely, in the language they write in."
        .to_string()
}
fn default_max_history() -> usize {
    10
}
fn default_max_message_chars() -> usize {
    4000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    800
}
fn default_cache_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u64 {
    30
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawler_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_crawler_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_crawler_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_crawler_endpoint(),
            api_key_env: default_crawler_key_env(),
            timeout_secs: default_crawler_timeout_secs(),
        }
    }
}

fn default_crawler_endpoint() -> String {
    "https://api.firecrawl.dev/v1/scrape".to_string()
}
fn default_crawler_key_env() -> String {
    "CRAWLER_API_KEY".to_string()
}
fn default_crawler_timeout_secs() -> u64 {
    60
}

impl Config {
    /// A config with every default and the given bind address and database
    /// path.
    pub fn minimal(bind: &str, db_path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                bind: bind.to_string(),
                allowed_origins: default_allowed_origins(),
                max_body_bytes: default_max_body_bytes(),
                trust_forwarded_for: false,
            },
            db: DbConfig {
                path: db_path.into(),
            },
            openai: OpenAiConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatConfig::default(),
            rate_limit: RateLimitConfig::default(),
            crawler: CrawlerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.server.allowed_origins.is_empty() {
        bail!("server.allowed_origins must not be empty (use [\"*\"] to allow any origin)");
    }

    if config.openai.embedding_dims == 0 {
        bail!("openai.embedding_dims must be > 0");
    }
    if config.openai.embedding_model.trim().is_empty() || config.openai.chat_model.trim().is_empty() {
        bail!("openai.embedding_model and openai.chat_model must be set");
    }

    if config.chunking.chunk_size > 0 && config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_n == 0 {
        bail!("retrieval.top_n must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
    }

    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }
    if config.chat.max_message_chars == 0 {
        bail!("chat.max_message_chars must be > 0");
    }

    if config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0 {
        bail!("rate_limit.max_requests and rate_limit.window_secs must be > 0");
    }

    Ok(config)
}
