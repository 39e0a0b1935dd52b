//! Tenant-scoped document store.
//!
//! The [`Store`] trait is the only way training data is persisted or read
//! back. Every operation is addressed by tenant id; no call can observe
//! another tenant's data.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert_source`](Store::insert_source) | Persist a source and all its chunks |
//! | [`list_sources`](Store::list_sources) | Tenant sources, newest first |
//! | [`get_source`](Store::get_source) | One source by id |
//! | [`delete_source`](Store::delete_source) | Remove a source and its chunks |
//! | [`tenant_chunks`](Store::tenant_chunks) | Every chunk, in insertion order |
//! | [`delete_tenant`](Store::delete_tenant) | Remove all tenant data |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EmbeddedChunk, TrainingSource};

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `source` together with its chunks, atomically where the
    /// backend allows it.
    async fn insert_source(&self, source: &TrainingSource, chunks: &[EmbeddedChunk]) -> Result<()>;

    async fn list_sources(&self, tenant_id: &str) -> Result<Vec<TrainingSource>>;

    async fn get_source(&self, tenant_id: &str, source_id: &str) -> Result<Option<TrainingSource>>;

    /// Returns `false` if the tenant has no such source.
    async fn delete_source(&self, tenant_id: &str, source_id: &str) -> Result<bool>;

    /// All chunks of a tenant ordered by source creation, then chunk index.
    async fn tenant_chunks(&self, tenant_id: &str) -> Result<Vec<EmbeddedChunk>>;

    /// Remove every source and chunk of a tenant. Returns the number of
    /// sources removed.
    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64>;
}
