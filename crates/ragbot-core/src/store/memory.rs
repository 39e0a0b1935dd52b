//! In-memory [`Store`] for tests and single-process deployments.
//!
//! Sources and chunks live in `Vec`s behind `RwLock`s; insertion order is
//! the storage order, which keeps retrieval tie-breaks deterministic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{EmbeddedChunk, TrainingSource};

use super::Store;

#[derive(Default)]
struct Tables {
    sources: Vec<TrainingSource>,
    chunks: Vec<EmbeddedChunk>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_source(&self, source: &TrainingSource, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut tables = self.write()?;
        if tables.sources.iter().any(|s| s.id == source.id) {
            return Err(anyhow!("source {} already exists", source.id));
        }
        tables.sources.push(source.clone());
        tables.chunks.extend_from_slice(chunks);
        Ok(())
    }

    async fn list_sources(&self, tenant_id: &str) -> Result<Vec<TrainingSource>> {
        let tables = self.read()?;
        let mut sources: Vec<TrainingSource> = tables
            .sources
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        sources.reverse();
        sources.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sources)
    }

    async fn get_source(&self, tenant_id: &str, source_id: &str) -> Result<Option<TrainingSource>> {
        let tables = self.read()?;
        Ok(tables
            .sources
            .iter()
            .find(|s| s.tenant_id == tenant_id && s.id == source_id)
            .cloned())
    }

    async fn delete_source(&self, tenant_id: &str, source_id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        let before = tables.sources.len();
        tables
            .sources
            .retain(|s| !(s.tenant_id == tenant_id && s.id == source_id));
        if tables.sources.len() == before {
            return Ok(false);
        }
        tables
            .chunks
            .retain(|c| !(c.tenant_id == tenant_id && c.source_id == source_id));
        Ok(true)
    }

    async fn tenant_chunks(&self, tenant_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let tables = self.read()?;
        Ok(tables
            .chunks
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64> {
        let mut tables = self.write()?;
        let before = tables.sources.len();
        tables.sources.retain(|s| s.tenant_id != tenant_id);
        tables.chunks.retain(|c| c.tenant_id != tenant_id);
        Ok((before - tables.sources.len()) as u64)
    }
}
