//! SQLite-backed [`VectorStore`] implementation.
//!
//! Schema (see [`migrate`](crate::migrate)): `documents` keyed by URL,
//! `chunks` keyed by chunk id, and `chunk_vectors` holding one
//! little-endian `f32` BLOB per chunk. Every write path runs in a single
//! transaction, which is what makes per-document replacement atomic for
//! concurrent readers.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, ChunkMetadata, DocumentMetadata, SourceStats, StoreStats, VectorRecord};

use super::{rank_neighbors, Neighbor, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open vector store at {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

async fn upsert_document_row(
    tx: &mut Transaction<'_, Sqlite>,
    document: &DocumentMetadata,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (url, source_name, source_type, title, content_hash, fetched_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            source_name = excluded.source_name,
            source_type = excluded.source_type,
            title = excluded.title,
            content_hash = excluded.content_hash,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(&document.source_url)
    .bind(&document.source_name)
    .bind(&document.source_type)
    .bind(&document.title)
    .bind(&document.content_hash)
    .bind(document.fetched_at.timestamp())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_record_rows(tx: &mut Transaction<'_, Sqlite>, record: &VectorRecord) -> Result<()> {
    let chunk = &record.chunk;
    sqlx::query(
        r#"
        INSERT INTO chunks (id, url, chunk_index, text, hash)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            url = excluded.url,
            chunk_index = excluded.chunk_index,
            text = excluded.text,
            hash = excluded.hash
        "#,
    )
    .bind(&chunk.id)
    .bind(chunk.source_url())
    .bind(chunk.metadata.chunk_index)
    .bind(&chunk.text)
    .bind(&chunk.hash)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, model, dims, hash, embedding)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            embedding = excluded.embedding
        "#,
    )
    .bind(&chunk.id)
    .bind(&record.model)
    .bind(record.embedding.len() as i64)
    .bind(&chunk.hash)
    .bind(vec_to_blob(&record.embedding))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        text: row.get("text"),
        hash: row.get("hash"),
        metadata: ChunkMetadata {
            document: DocumentMetadata {
                source_url: row.get("url"),
                title: row.get("title"),
                source_name: row.get("source_name"),
                source_type: row.get("source_type"),
                fetched_at: from_timestamp(row.get("fetched_at")),
                content_hash: row.get("content_hash"),
            },
            chunk_index: row.get("chunk_index"),
        },
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn exists(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn replace_document(
        &self,
        document: &DocumentMetadata,
        records: &[VectorRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE url = ?)",
        )
        .bind(&document.source_url)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE url = ?")
            .bind(&document.source_url)
            .execute(&mut *tx)
            .await?;

        upsert_document_row(&mut tx, document).await?;
        for record in records {
            upsert_record_rows(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_document(&self, source_url: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE url = ?)",
        )
        .bind(source_url)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunks WHERE url = ?")
            .bind(source_url)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE url = ?")
            .bind(source_url)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_records(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            upsert_document_row(&mut tx, &record.chunk.metadata.document).await?;
            upsert_record_rows(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn cached_embedding(
        &self,
        chunk_id: &str,
        model: &str,
        hash: &str,
    ) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT embedding FROM chunk_vectors WHERE chunk_id = ? AND model = ? AND hash = ?",
        )
        .bind(chunk_id)
        .bind(model)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blob.map(|b| blob_to_vec(&b)))
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.url, c.chunk_index, c.text, c.hash,
                   d.title, d.source_name, d.source_type, d.fetched_at, d.content_hash,
                   cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.url = c.url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let neighbors = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                Neighbor {
                    similarity: cosine_similarity(query, &embedding),
                    chunk: row_to_chunk(row),
                    embedding,
                }
            })
            .collect();

        Ok(rank_neighbors(neighbors, limit))
    }

    async fn models(&self) -> Result<Vec<String>> {
        let models = sqlx::query_scalar("SELECT DISTINCT model FROM chunk_vectors ORDER BY model")
            .fetch_all(&self.pool)
            .await?;
        Ok(models)
    }

    async fn document_hashes(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT url, content_hash FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("url"), row.get("content_hash")))
            .collect())
    }

    async fn chunk_ids(&self, source_url: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM chunks WHERE url = ? ORDER BY chunk_index")
            .bind(source_url)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT d.source_name,
                   COUNT(DISTINCT d.url) AS documents,
                   COUNT(c.id) AS chunks,
                   MAX(d.fetched_at) AS last_fetched
            FROM documents d
            LEFT JOIN chunks c ON c.url = d.url
            GROUP BY d.source_name
            ORDER BY d.source_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let by_source = rows
            .iter()
            .map(|row| {
                let last: Option<i64> = row.get("last_fetched");
                SourceStats {
                    source: row.get("source_name"),
                    documents: row.get("documents"),
                    chunks: row.get("chunks"),
                    last_fetched: last.map(from_timestamp),
                }
            })
            .collect();

        Ok(StoreStats {
            documents,
            chunks,
            embedded,
            by_source,
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
