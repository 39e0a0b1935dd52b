//! SQLite-backed [`Store`] implementation.
//!
//! Sources and chunks live in two tables (see [`crate::migrate`]); chunk
//! embeddings are stored as little-endian `f32` blobs and decoded on read.
//! Ties on `created_at` fall back to `rowid`, so reads observe insertion
//! order just like [`InMemoryStore`](ragbot_core::store::memory::InMemoryStore).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ragbot_core::embedding::{blob_to_vec, vec_to_blob};
use ragbot_core::models::{EmbeddedChunk, SourceKind, TrainingSource};
use ragbot_core::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn source_from_row(row: &SqliteRow) -> Result<TrainingSource> {
    let kind: String = row.get("kind");
    let tags_json: String = row.get("tags_json");
    let chunk_count: i64 = row.get("chunk_count");
    Ok(TrainingSource {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        kind: SourceKind::parse(&kind).with_context(|| format!("unknown source kind '{}'", kind))?,
        title: row.get("title"),
        source_url: row.get("source_url"),
        tags: serde_json::from_str(&tags_json).context("corrupt tags_json column")?,
        chunk_count: chunk_count.max(0) as usize,
        created_at: row.get("created_at"),
    })
}

fn chunk_from_row(row: &SqliteRow) -> EmbeddedChunk {
    let index: i64 = row.get("chunk_index");
    let blob: Vec<u8> = row.get("embedding");
    EmbeddedChunk {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        source_id: row.get("source_id"),
        index: index.max(0) as usize,
        text: row.get("text"),
        source_url: row.get("source_url"),
        heading: row.get("heading"),
        embedding: blob_to_vec(&blob),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_source(&self, source: &TrainingSource, chunks: &[EmbeddedChunk]) -> Result<()> {
        let tags_json = serde_json::to_string(&source.tags)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sources (id, tenant_id, kind, title, source_url, tags_json,
                                 chunk_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.tenant_id)
        .bind(source.kind.as_str())
        .bind(&source.title)
        .bind(&source.source_url)
        .bind(&tags_json)
        .bind(source.chunk_count as i64)
        .bind(source.created_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert source {}", source.id))?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, tenant_id, source_id, chunk_index, text,
                                    source_url, heading, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.tenant_id)
            .bind(&chunk.source_id)
            .bind(chunk.index as i64)
            .bind(&chunk.text)
            .bind(&chunk.source_url)
            .bind(&chunk.heading)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_sources(&self, tenant_id: &str) -> Result<Vec<TrainingSource>> {
        let rows = sqlx::query(
            "SELECT * FROM sources WHERE tenant_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn get_source(&self, tenant_id: &str, source_id: &str) -> Result<Option<TrainingSource>> {
        let row = sqlx::query("SELECT * FROM sources WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn delete_source(&self, tenant_id: &str, source_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE tenant_id = ? AND source_id = ?")
            .bind(tenant_id)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tenant_chunks(&self, tenant_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM chunks c
            JOIN sources s ON s.id = c.source_id
            WHERE c.tenant_id = ?
            ORDER BY s.created_at ASC, s.rowid ASC, c.chunk_index ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
