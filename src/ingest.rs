//! Training data ingestion.
//!
//! Every input kind goes through the same pipeline:
//!
//! ```text
//! input ──► chunks ──► generate_embeddings ──► classify_tags ──► Store::insert_source
//! ```
//!
//! | Input | Chunking |
//! |-------|----------|
//! | Text | `chunk_text` |
//! | Q&A file | one chunk per pair |
//! | URL | crawled markdown, `chunk_markdown` with the page URL |
//! | File | extracted text; `chunk_markdown` for markdown, `chunk_text` otherwise |
//!
//! Embedding and tagging never fail the ingestion (they degrade to zero
//! vectors and fallback tags). Malformed input is an
//! [`ApiError::Validation`]; a crawler failure is [`ApiError::Upstream`].

use std::path::Path;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

use ragbot_core::chunk::{chunk_markdown, chunk_text};
use ragbot_core::embedding::generate_embeddings;
use ragbot_core::models::{validate_tenant_id, Chunk, EmbeddedChunk, SourceKind, TrainingSource};
use ragbot_core::qa::parse_qa_pairs;
use ragbot_core::tags::classify_tags;
use ragbot_core::{ApiError, ApiResult};

use crate::chat;
use crate::extract::{self, ExtractError};
use crate::services::Services;

const MAX_TITLE_CHARS: usize = 80;

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Declared MIME type; the extension decides when absent.
    pub content_type: Option<String>,
}

pub async fn train_text(
    svc: &Services,
    tenant_id: &str,
    title: Option<&str>,
    text: &str,
) -> ApiResult<TrainingSource> {
    validate_tenant_id(tenant_id)?;
    if text.trim().is_empty() {
        return Err(ApiError::Validation("text is empty".to_string()));
    }
    let title = non_blank(title).unwrap_or_else(|| title_from_text(text));
    let chunks = plain_chunks(svc, text);
    persist(svc, tenant_id, SourceKind::Text, title, None, text, chunks).await
}

/// Ingest a Q&A file: one `question | answer` pair per line.
pub async fn train_qa(
    svc: &Services,
    tenant_id: &str,
    title: Option<&str>,
    content: &str,
) -> ApiResult<TrainingSource> {
    validate_tenant_id(tenant_id)?;
    let pairs = parse_qa_pairs(content)?;
    let title = non_blank(title).unwrap_or_else(|| format!("Q&A ({} pairs)", pairs.len()));
    let chunks = pairs.iter().map(|p| p.to_chunk()).collect();
    persist(svc, tenant_id, SourceKind::Qa, title, None, content, chunks).await
}

pub async fn train_url(svc: &Services, tenant_id: &str, url: &str) -> ApiResult<TrainingSource> {
    validate_tenant_id(tenant_id)?;
    let url = validate_url(url)?;

    let page = svc
        .crawler
        .fetch(&url)
        .await
        .map_err(|e| ApiError::upstream(format!("crawling {} failed: {:#}", url, e)))?;
    if page.content.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} has no readable content", url)));
    }

    let chunks = chunk_markdown(
        &page.content,
        svc.config.chunking.chunk_size,
        svc.config.chunking.overlap,
        Some(page.url.as_str()),
    );
    let title = page.title.clone().unwrap_or_else(|| page.url.clone());
    persist(
        svc,
        tenant_id,
        SourceKind::Url,
        title,
        Some(page.url.clone()),
        &page.content,
        chunks,
    )
    .await
}

pub async fn train_file(
    svc: &Services,
    tenant_id: &str,
    upload: &FileUpload,
) -> ApiResult<TrainingSource> {
    validate_tenant_id(tenant_id)?;
    if upload.bytes.is_empty() {
        return Err(ApiError::Validation("file is empty".to_string()));
    }

    let content_type = extract::resolve_content_type(upload.content_type.as_deref(), &upload.filename);
    let text = extract::extract_text(&upload.bytes, &content_type).map_err(|e| match e {
        ExtractError::UnsupportedContentType(_) | ExtractError::NotUtf8 => {
            ApiError::Validation(format!("{}: {}", upload.filename, e))
        }
        ExtractError::Pdf(_) | ExtractError::Ooxml(_) => {
            ApiError::Validation(format!("{}: could not read file ({})", upload.filename, e))
        }
    })?;
    if text.trim().is_empty() {
        return Err(ApiError::Validation(format!(
            "{}: no text could be extracted",
            upload.filename
        )));
    }

    let chunks = if extract::is_markdown(&content_type) {
        chunk_markdown(
            &text,
            svc.config.chunking.chunk_size,
            svc.config.chunking.overlap,
            None,
        )
    } else {
        plain_chunks(svc, &text)
    };
    let title = non_blank(Some(upload.filename.as_str())).unwrap_or_else(|| title_from_text(&text));
    persist(svc, tenant_id, SourceKind::File, title, None, &text, chunks).await
}

pub async fn list_sources(svc: &Services, tenant_id: &str) -> ApiResult<Vec<TrainingSource>> {
    validate_tenant_id(tenant_id)?;
    Ok(svc.store.list_sources(tenant_id).await?)
}

/// Remove one source and its chunks.
pub async fn delete_source(svc: &Services, tenant_id: &str, source_id: &str) -> ApiResult<()> {
    validate_tenant_id(tenant_id)?;
    if !svc.store.delete_source(tenant_id, source_id).await? {
        return Err(ApiError::NotFound(format!("source {} not found", source_id)));
    }
    chat::invalidate_answers(svc, tenant_id).await;
    info!(tenant_id, source_id, "deleted source");
    Ok(())
}

/// Remove all training data of a tenant. Returns the number of sources removed.
pub async fn purge_tenant(svc: &Services, tenant_id: &str) -> ApiResult<u64> {
    validate_tenant_id(tenant_id)?;
    let removed = svc.store.delete_tenant(tenant_id).await?;
    chat::invalidate_answers(svc, tenant_id).await;
    info!(tenant_id, removed, "purged tenant");
    Ok(removed)
}

/// Outcome of [`train_dir`].
#[derive(Debug, Default)]
pub struct DirReport {
    pub trained: Vec<TrainingSource>,
    /// Relative path and reason for every file that was rejected.
    pub skipped: Vec<(String, String)>,
}

/// Walk `root` and ingest every file matching `include` and not `exclude`
/// (globs relative to `root`). Files rejected as invalid are reported and
/// skipped; any other failure stops the walk.
pub async fn train_dir(
    svc: &Services,
    tenant_id: &str,
    root: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<DirReport> {
    if !root.is_dir() {
        bail!("Training directory does not exist: {}", root.display());
    }
    let include_set = build_globset(include)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    excludes.extend(exclude.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        if exclude_set.is_match(&rel) || !include_set.is_match(&rel) {
            continue;
        }
        files.push((rel, path.to_path_buf()));
    }
    files.sort();

    let mut report = DirReport::default();
    for (rel, path) in files {
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let upload = FileUpload {
            filename: rel.clone(),
            bytes,
            content_type: None,
        };
        match train_file(svc, tenant_id, &upload).await {
            Ok(source) => report.trained.push(source),
            Err(ApiError::Validation(reason)) => {
                warn!(file = %rel, %reason, "skipping file");
                report.skipped.push((rel, reason));
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to train {}", rel))),
        }
    }

    info!(
        tenant_id,
        root = %root.display(),
        trained = report.trained.len(),
        skipped = report.skipped.len(),
        "directory training complete"
    );
    Ok(report)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn plain_chunks(svc: &Services, text: &str) -> Vec<Chunk> {
    chunk_text(text, svc.config.chunking.chunk_size, svc.config.chunking.overlap)
        .into_iter()
        .map(Chunk::plain)
        .collect()
}

async fn persist(
    svc: &Services,
    tenant_id: &str,
    kind: SourceKind,
    title: String,
    source_url: Option<String>,
    full_text: &str,
    chunks: Vec<Chunk>,
) -> ApiResult<TrainingSource> {
    if chunks.is_empty() {
        return Err(ApiError::Validation("no trainable text".to_string()));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = generate_embeddings(&*svc.embedder, &texts).await;
    let tags = classify_tags(&*svc.completer, full_text).await;

    let source_id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().timestamp();
    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (chunk, embedding))| EmbeddedChunk {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            source_id: source_id.clone(),
            index,
            text: chunk.text,
            source_url: chunk.source_url,
            heading: chunk.heading,
            embedding,
            created_at,
        })
        .collect();

    let source = TrainingSource {
        id: source_id,
        tenant_id: tenant_id.to_string(),
        kind,
        title,
        source_url,
        tags,
        chunk_count: embedded.len(),
        created_at,
    };
    svc.store.insert_source(&source, &embedded).await?;
    chat::invalidate_answers(svc, &source.tenant_id).await;

    info!(
        tenant_id,
        source_id = %source.id,
        kind = source.kind.as_str(),
        chunks = source.chunk_count,
        tags = ?source.tags,
        "trained source"
    );
    Ok(source)
}

fn validate_url(raw: &str) -> ApiResult<String> {
    let parsed = reqwest::Url::parse(raw.trim())
        .map_err(|e| ApiError::Validation(format!("invalid URL '{}': {}", raw.trim(), e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed.to_string()),
        _ => Err(ApiError::Validation(format!(
            "URL must use http or https: {}",
            raw.trim()
        ))),
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// First non-blank line, cut to [`MAX_TITLE_CHARS`].
fn title_from_text(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("untitled");
    let line = line.trim_start_matches('#').trim();
    if line.chars().count() <= MAX_TITLE_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_line() {
        assert_eq!(title_from_text("\n\n# Shipping\nWe ship daily."), "Shipping");
        let long = "word ".repeat(40);
        let title = title_from_text(&long);
        assert!(title.ends_with('…'));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn urls_must_be_http() {
        assert_eq!(validate_url(" https://example.com/a ").unwrap(), "https://example.com/a");
        assert!(matches!(validate_url("ftp://example.com"), Err(ApiError::Validation(_))));
        assert!(matches!(validate_url("not a url"), Err(ApiError::Validation(_))));
    }

    #[test]
    fn blank_titles_are_ignored() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" FAQ ")), Some("FAQ".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
