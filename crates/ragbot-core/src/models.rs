//! Core data models that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Dimensionality of every stored and query embedding.
pub const EMBEDDING_DIMS: usize = 1536;

/// Maximum length of a tenant identifier.
const MAX_TENANT_ID_LEN: usize = 128;

/// A piece of training text produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_url: Option<String>,
    pub heading: Option<String>,
}

impl Chunk {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_url: None,
            heading: None,
        }
    }
}

/// A chunk with its embedding, persisted under a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: String,
    pub tenant_id: String,
    /// The [`TrainingSource`] this chunk was cut from.
    pub source_id: String,
    /// Position of the chunk within its source.
    pub index: usize,
    pub text: String,
    pub source_url: Option<String>,
    pub heading: Option<String>,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    /// Unix seconds.
    pub created_at: i64,
}

/// An [`EmbeddedChunk`] scored against a query. Lives for one retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: EmbeddedChunk,
    pub similarity: f32,
}

/// Who said a [`ChatTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One turn of conversation history, as supplied by the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Speaker,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// Kind of training data a [`TrainingSource`] was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Qa,
    Url,
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Text => "text",
            SourceKind::Qa => "qa",
            SourceKind::Url => "url",
            SourceKind::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SourceKind::Text),
            "qa" => Some(SourceKind::Qa),
            "url" => Some(SourceKind::Url),
            "file" => Some(SourceKind::File),
            _ => None,
        }
    }
}

/// One ingested unit of tenant training data. Owns its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSource {
    pub id: String,
    pub tenant_id: String,
    pub kind: SourceKind,
    pub title: String,
    pub source_url: Option<String>,
    pub tags: Vec<String>,
    pub chunk_count: usize,
    pub created_at: i64,
}

/// Citation metadata returned alongside an answer.
///
/// `index` is the bracketed number the chunk carried in the prompt context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub index: usize,
    pub source_id: String,
    pub source_url: Option<String>,
    pub heading: Option<String>,
    pub similarity: f32,
}

/// Check that a tenant id is 1–128 characters of `[A-Za-z0-9_-]`.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), ApiError> {
    if tenant_id.is_empty() {
        return Err(ApiError::Validation("tenant id must not be empty".into()));
    }
    if tenant_id.len() > MAX_TENANT_ID_LEN {
        return Err(ApiError::Validation(format!(
            "tenant id must be at most {} characters",
            MAX_TENANT_ID_LEN
        )));
    }
    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::Validation(format!(
            "invalid tenant id '{}': only letters, digits, '-' and '_' are allowed",
            tenant_id
        )));
    }
    Ok(())
}
