//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use ragbot::config::Config;
use ragbot::services::Services;
use ragbot_core::completion::{Completer, CompletionOptions, Message};
use ragbot_core::crawl::{CrawledPage, Crawler};
use ragbot_core::embedding::Embedder;
use ragbot_core::store::memory::InMemoryStore;
use ragbot_core::store::Store;
use ragbot_core::ttl::{MemoryTtlStore, TtlStore};

/// Words the fake embedder knows; one dimension each.
pub const VOCAB: [&str; 8] = [
    "shipping", "refund", "price", "hours", "rust", "python", "pizza", "garden",
];

/// Bag-of-words embedder over [`VOCAB`]: texts sharing words are similar.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        let lower = text.to_lowercase();
        Ok(VOCAB
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect())
    }
}

/// Completer that answers tag requests (single message) with fixed tags
/// and chat requests with a fixed answer, recording every call.
pub struct ScriptedCompleter {
    pub tags_reply: String,
    pub answer_reply: String,
    pub fail_answers: AtomicBool,
    pub calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for ScriptedCompleter {
    fn default() -> Self {
        Self {
            tags_reply: "Shipping, Customer Support, Pricing".to_string(),
            answer_reply: "We ship worldwide [1].".to_string(),
            fail_answers: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedCompleter {
    /// Messages of every chat (non-tag) call.
    pub fn chat_calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.len() > 1)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    fn model_name(&self) -> &str {
        "scripted-test"
    }

    async fn complete(&self, messages: &[Message], _options: &CompletionOptions) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if messages.len() == 1 {
            return Ok(self.tags_reply.clone());
        }
        if self.fail_answers.load(Ordering::SeqCst) {
            bail!("completion service unavailable");
        }
        Ok(self.answer_reply.clone())
    }
}

/// Serves canned pages by URL.
#[derive(Default)]
pub struct StaticCrawler {
    pub pages: HashMap<String, CrawledPage>,
}

impl StaticCrawler {
    pub fn with_page(url: &str, title: Option<&str>, content: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(
            url.to_string(),
            CrawledPage {
                url: url.to_string(),
                title: title.map(str::to_string),
                content: content.to_string(),
            },
        );
        Self { pages }
    }
}

#[async_trait]
impl Crawler for StaticCrawler {
    async fn fetch(&self, url: &str) -> Result<CrawledPage> {
        match self.pages.get(url) {
            Some(page) => Ok(page.clone()),
            None => bail!("404 for {}", url),
        }
    }
}

pub struct TestBed {
    pub svc: Arc<Services>,
    pub embedder: Arc<KeywordEmbedder>,
    pub completer: Arc<ScriptedCompleter>,
    pub store: Arc<InMemoryStore>,
}

pub fn test_config() -> Config {
    let mut config = Config::minimal("127.0.0.1:0", "unused.sqlite");
    config.chunking.chunk_size = 30;
    config.chunking.overlap = 5;
    config.retrieval.top_n = 3;
    config.retrieval.min_similarity = 0.1;
    config
}

pub fn testbed(config: Config) -> TestBed {
    testbed_with(config, StaticCrawler::default(), Arc::new(InMemoryStore::new()))
}

pub fn testbed_with(config: Config, crawler: StaticCrawler, store: Arc<InMemoryStore>) -> TestBed {
    let embedder = Arc::new(KeywordEmbedder::default());
    let completer = Arc::new(ScriptedCompleter::default());
    let ttl: Arc<dyn TtlStore> = Arc::new(MemoryTtlStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();
    let svc = Services::new(
        config,
        store_dyn,
        embedder.clone(),
        completer.clone(),
        Arc::new(crawler),
        ttl,
    );
    TestBed {
        svc: Arc::new(svc),
        embedder,
        completer,
        store,
    }
}
