//! Similarity ranking and context assembly.
//!
//! Retrieval is a full linear scan over a tenant's chunks: every chunk is
//! scored against the query with [`cosine_similarity`], the list is sorted
//! by descending similarity and truncated to `top_n`. Tenant corpora are
//! small enough that no index structure is kept.

use std::fmt::Write as _;

use crate::embedding::cosine_similarity;
use crate::models::{EmbeddedChunk, ScoredChunk, SourceRef};

/// Score every chunk against `query` and keep the best `top_n`.
///
/// The sort is stable: chunks with equal similarity keep their input order.
/// Asking for more than are available returns all of them.
pub fn rank_chunks<I>(query: &[f32], chunks: I, top_n: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = EmbeddedChunk>,
{
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let similarity = cosine_similarity(query, &chunk.embedding);
            ScoredChunk { chunk, similarity }
        })
        .collect();

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(top_n);
    scored
}

/// Render retrieved chunks as numbered context blocks, starting at `[1]`.
///
/// ```text
/// [1] Source: https://example.com/pricing (Plans)
/// Plans start at ten dollars.
///
/// [2] Source: training data
/// ...
/// ```
pub fn build_context(scored: &[ScoredChunk]) -> String {
    let mut out = String::new();
    for (i, sc) in scored.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let origin = sc.chunk.source_url.as_deref().unwrap_or("training data");
        let _ = write!(out, "[{}] Source: {}", i + 1, origin);
        if let Some(heading) = &sc.chunk.heading {
            let _ = write!(out, " ({})", heading);
        }
        out.push('\n');
        out.push_str(sc.chunk.text.trim());
    }
    out
}

/// Citation metadata for each chunk, numbered the same way as [`build_context`].
pub fn source_refs(scored: &[ScoredChunk]) -> Vec<SourceRef> {
    scored
        .iter()
        .enumerate()
        .map(|(i, sc)| SourceRef {
            index: i + 1,
            source_id: sc.chunk.source_id.clone(),
            source_url: sc.chunk.source_url.clone(),
            heading: sc.chunk.heading.clone(),
            similarity: sc.similarity,
        })
        .collect()
}
