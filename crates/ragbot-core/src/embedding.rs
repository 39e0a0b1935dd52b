//! Embedding seam and vector utilities.
//!
//! [`Embedder`] is implemented by the application's OpenAI client (and by
//! fakes in tests). [`generate_embeddings`] is the batch entry point used by
//! ingestion: it never fails, substituting a zero vector for any text the
//! provider could not embed.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// A text-in, vector-out embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embed every text in order, one provider call per text.
///
/// The output has the same length and order as `texts`. When the provider
/// fails for a text, or returns a vector of the wrong dimensionality, that
/// slot holds a zero vector of [`Embedder::dims`] and a warning is logged.
/// Other slots are unaffected.
pub async fn generate_embeddings<E>(embedder: &E, texts: &[String]) -> Vec<Vec<f32>>
where
    E: Embedder + ?Sized,
{
    let dims = embedder.dims();
    let mut vectors = Vec::with_capacity(texts.len());

    for (index, text) in texts.iter().enumerate() {
        match embedder.embed(text).await {
            Ok(vector) if vector.len() == dims => vectors.push(vector),
            Ok(vector) => {
                warn!(
                    index,
                    expected = dims,
                    got = vector.len(),
                    model = embedder.model_name(),
                    "embedding has wrong dimensionality, using zero vector"
                );
                vectors.push(vec![0.0; dims]);
            }
            Err(e) => {
                warn!(
                    index,
                    model = embedder.model_name(),
                    error = %e,
                    "embedding failed, using zero vector"
                );
                vectors.push(vec![0.0; dims]);
            }
        }
    }

    vectors
}

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
///
/// ```rust
/// use ragbot_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.25];
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` when the vectors differ in length, are empty, or either has
/// zero magnitude. Sums are accumulated in `f64` so tiny vectors score the
/// same as their scaled-up copies; the result is never NaN.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64, y as f64))
        .fold((0.0f64, 0.0f64, 0.0f64), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity as f32
}
