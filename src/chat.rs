//! Answering visitor questions.
//!
//! [`answer`] runs the full retrieval-augmented pipeline for one message:
//! validation, rate limiting, the answer cache, query embedding, similarity
//! search over the tenant's chunks, prompt assembly, and the completion
//! call. The returned [`ChatAnswer::sources`] are numbered exactly like the
//! `[n]` labels the model was shown, so citations in the answer text can be
//! resolved by index.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use ragbot_core::completion::CompletionOptions;
use ragbot_core::models::{validate_tenant_id, ChatTurn, ScoredChunk, SourceRef};
use ragbot_core::prompt::{build_prompt, PromptInput};
use ragbot_core::retrieval::{build_context, rank_chunks, source_refs};
use ragbot_core::store::Store;
use ragbot_core::{ApiError, ApiResult};

use crate::services::Services;

/// Largest `top_n` a search caller may ask for.
pub const MAX_SEARCH_RESULTS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// Overrides `[chat].system_prompt` for this request.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// True when served from the answer cache.
    pub cached: bool,
}

/// Score every chunk of `tenant_id` against `query` and return the best
/// `top_n`, most similar first.
pub async fn find_most_similar_chunks(
    store: &dyn Store,
    tenant_id: &str,
    query: &[f32],
    top_n: usize,
) -> Result<Vec<ScoredChunk>> {
    let chunks = store.tenant_chunks(tenant_id).await?;
    let candidates = chunks.len();
    let scored = rank_chunks(query, chunks, top_n);
    debug!(tenant_id, candidates, returned = scored.len(), "similarity search");
    Ok(scored)
}

/// Answer one chat message for `tenant_id`. `client_key` identifies the
/// caller for rate limiting (the client IP over HTTP).
pub async fn answer(
    svc: &Services,
    tenant_id: &str,
    client_key: &str,
    request: &ChatRequest,
) -> ApiResult<ChatAnswer> {
    validate_tenant_id(tenant_id)?;
    let message = request.message.trim();
    validate_message(message, svc.config.chat.max_message_chars)?;
    if request.history.iter().any(|t| t.content.trim().is_empty()) {
        return Err(ApiError::Validation("history turns must not be empty".to_string()));
    }

    svc.rate_limiter
        .check(&format!("chat:{}:{}", tenant_id, client_key))
        .await?;

    let cache_key = if request.history.is_empty() && svc.config.chat.cache_ttl().is_some() {
        answer_generation(svc, tenant_id).await.map(|generation| {
            answer_cache_key(tenant_id, &generation, message, request.system_prompt.as_deref())
        })
    } else {
        None
    };
    if let Some(key) = &cache_key {
        if let Some(hit) = cached_answer(svc, key).await {
            debug!(tenant_id, "answer cache hit");
            return Ok(hit);
        }
    }

    let scored = match embed_query(svc, message).await {
        Some(query) => {
            let found = find_most_similar_chunks(
                svc.store.as_ref(),
                tenant_id,
                &query,
                svc.config.retrieval.top_n,
            )
            .await?;
            let min = svc.config.retrieval.min_similarity;
            found.into_iter().filter(|sc| sc.similarity >= min).collect()
        }
        None => Vec::new(),
    };
    let context = build_context(&scored);

    let keep_from = request
        .history
        .len()
        .saturating_sub(svc.config.chat.max_history);
    let history = &request.history[keep_from..];

    let system = request
        .system_prompt
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(svc.config.chat.system_prompt.as_str());
    let messages = build_prompt(&PromptInput {
        system: Some(system),
        history,
        context: &context,
        user_message: message,
    });

    let options = CompletionOptions {
        temperature: svc.config.chat.temperature,
        max_tokens: svc.config.chat.max_tokens,
    };
    let text = svc
        .completer
        .complete(&messages, &options)
        .await
        .map_err(|e| {
            warn!(tenant_id, error = %format!("{:#}", e), "completion failed");
            ApiError::upstream(format!("answer generation failed: {:#}", e))
        })?;

    let result = ChatAnswer {
        answer: text,
        sources: source_refs(&scored),
        cached: false,
    };
    info!(
        tenant_id,
        context_chunks = scored.len(),
        history = history.len(),
        "answered chat message"
    );

    if let Some(key) = &cache_key {
        store_answer(svc, key, &result).await;
    }
    Ok(result)
}

/// Rank chunks for a free-text query. Unlike chat there is no fallback when
/// the query cannot be embedded.
pub async fn search(
    svc: &Services,
    tenant_id: &str,
    query: &str,
    top_n: Option<usize>,
) -> ApiResult<Vec<ScoredChunk>> {
    validate_tenant_id(tenant_id)?;
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::Validation("query is empty".to_string()));
    }
    let top_n = top_n
        .unwrap_or(svc.config.retrieval.top_n)
        .clamp(1, MAX_SEARCH_RESULTS);

    let vector = svc
        .embedder
        .embed(query)
        .await
        .map_err(|e| ApiError::upstream(format!("query embedding failed: {:#}", e)))?;
    Ok(find_most_similar_chunks(svc.store.as_ref(), tenant_id, &vector, top_n).await?)
}

fn validate_message(message: &str, max_chars: usize) -> ApiResult<()> {
    if message.is_empty() {
        return Err(ApiError::Validation("message is empty".to_string()));
    }
    let len = message.chars().count();
    if len > max_chars {
        return Err(ApiError::Validation(format!(
            "message is too long ({} characters, max {})",
            len, max_chars
        )));
    }
    Ok(())
}

/// Embed the user message. `None` means "answer without context".
async fn embed_query(svc: &Services, message: &str) -> Option<Vec<f32>> {
    match svc.embedder.embed(message).await {
        Ok(v) if v.len() == svc.embedder.dims() => Some(v),
        Ok(v) => {
            warn!(
                got = v.len(),
                expected = svc.embedder.dims(),
                "query embedding has wrong dimensionality, answering without context"
            );
            None
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "query embedding failed, answering without context");
            None
        }
    }
}

/// Make every cached answer of `tenant_id` unreachable. Called whenever the
/// tenant's training data changes.
pub async fn invalidate_answers(svc: &Services, tenant_id: &str) {
    let Some(ttl) = svc.config.chat.cache_ttl() else {
        return;
    };
    let generation = uuid::Uuid::new_v4().simple().to_string();
    match svc.cache.set(&generation_key(tenant_id), generation, ttl).await {
        Ok(()) => debug!(tenant_id, "answer cache invalidated"),
        Err(e) => warn!(tenant_id, error = %format!("{:#}", e), "answer cache invalidation failed"),
    }
}

fn generation_key(tenant_id: &str) -> String {
    format!("answer-gen:{}", tenant_id)
}

/// Current cache generation of a tenant, `"0"` if it was never invalidated.
///
/// A generation lives exactly as long as a cached answer, so once it expires
/// every answer stored under an older generation has expired as well.
/// `None` disables the cache for this request.
async fn answer_generation(svc: &Services, tenant_id: &str) -> Option<String> {
    match svc.cache.get(&generation_key(tenant_id)).await {
        Ok(generation) => Some(generation.unwrap_or_else(|| "0".to_string())),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "answer cache read failed");
            None
        }
    }
}

fn answer_cache_key(
    tenant_id: &str,
    generation: &str,
    message: &str,
    system_prompt: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    if let Some(system) = system_prompt {
        hasher.update([0u8]);
        hasher.update(system.as_bytes());
    }
    format!("answer:{}:{}:{:x}", tenant_id, generation, hasher.finalize())
}

/// Cache failures only cost a recomputation, so they are logged and ignored.
async fn cached_answer(svc: &Services, key: &str) -> Option<ChatAnswer> {
    match svc.cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<ChatAnswer>(&raw) {
            Ok(mut hit) => {
                hit.cached = true;
                Some(hit)
            }
            Err(e) => {
                warn!(error = %e, "discarding unreadable cached answer");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "answer cache read failed");
            None
        }
    }
}

async fn store_answer(svc: &Services, key: &str, result: &ChatAnswer) {
    let Some(ttl) = svc.config.chat.cache_ttl() else {
        return;
    };
    let raw = match serde_json::to_string(result) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "could not serialise answer for cache");
            return;
        }
    };
    if let Err(e) = svc.cache.set(key, raw, ttl).await {
        warn!(error = %format!("{:#}", e), "answer cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_depends_on_tenant_generation_message_and_prompt() {
        let a = answer_cache_key("t1", "0", "hello", None);
        assert_eq!(a, answer_cache_key("t1", "0", "hello", None));
        assert_ne!(a, answer_cache_key("t2", "0", "hello", None));
        assert_ne!(a, answer_cache_key("t1", "0", "hello!", None));
        assert_ne!(a, answer_cache_key("t1", "0", "hello", Some("be brief")));
        assert_ne!(a, answer_cache_key("t1", "7f3a", "hello", None));
        assert!(a.starts_with("answer:t1:0:"));
        assert_eq!(a.len(), "answer:t1:0:".len() + 64);
    }

    #[test]
    fn message_length_is_counted_in_chars() {
        assert!(validate_message(&"é".repeat(10), 10).is_ok());
        assert!(matches!(
            validate_message(&"é".repeat(11), 10),
            Err(ApiError::Validation(_))
        ));
        assert!(validate_message("", 10).is_err());
    }
}
