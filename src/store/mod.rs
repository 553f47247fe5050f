//! Storage abstraction for the vector index.
//!
//! The [`VectorStore`] trait defines the persistence operations the index
//! and orchestrator need, enabling pluggable backends:
//!
//! - [`InMemoryStore`]: `HashMap`s behind one `RwLock`; lost on exit.
//! - [`SqliteStore`]: sqlx over a WAL-mode SQLite file; survives restarts.
//!
//! Both backends search by brute-force cosine similarity over every stored
//! vector, which is adequate for documentation-sized corpora.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::models::{Chunk, DocumentMetadata, StoreStats, VectorRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A stored chunk together with its vector and raw cosine similarity
/// to the query.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f32,
}

/// Abstract storage backend for embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists`](VectorStore::exists) | Whether any persisted vectors are present |
/// | [`replace_document`](VectorStore::replace_document) | Atomically swap all records of one URL |
/// | [`upsert_records`](VectorStore::upsert_records) | Insert or replace records by chunk id |
/// | [`cached_embedding`](VectorStore::cached_embedding) | Reuse a vector for unchanged text |
/// | [`nearest`](VectorStore::nearest) | Cosine nearest neighbours |
/// | [`remove_document`](VectorStore::remove_document) | Drop one URL and its records |
/// | [`models`](VectorStore::models) | Embedding models present in the store |
/// | [`document_hashes`](VectorStore::document_hashes) | `source_url → content_hash` |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name reported in status output (`"memory"`, `"sqlite"`).
    fn backend(&self) -> &'static str;

    async fn exists(&self) -> Result<bool>;

    /// Replace every record of `document.source_url` with `records`.
    ///
    /// Readers observe either the old or the new set, never a mix.
    async fn replace_document(
        &self,
        document: &DocumentMetadata,
        records: &[VectorRecord],
    ) -> Result<()>;

    /// Remove one document and every record of it. Unknown URLs are a no-op.
    async fn remove_document(&self, source_url: &str) -> Result<()>;

    /// Insert records, replacing any existing record with the same chunk id.
    async fn upsert_records(&self, records: &[VectorRecord]) -> Result<()>;

    /// The stored vector for `chunk_id` if it was produced by `model`
    /// from text with hash `hash`.
    async fn cached_embedding(
        &self,
        chunk_id: &str,
        model: &str,
        hash: &str,
    ) -> Result<Option<Vec<f32>>>;

    /// Up to `limit` records by descending cosine similarity to `query`.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>>;

    /// Distinct embedding model names of the stored vectors, sorted.
    async fn models(&self) -> Result<Vec<String>>;

    async fn document_hashes(&self) -> Result<HashMap<String, String>>;

    /// Chunk ids of one document, ordered by chunk index.
    async fn chunk_ids(&self, source_url: &str) -> Result<Vec<String>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Remove every document, chunk, and vector.
    async fn clear(&self) -> Result<()>;
}

/// Open the backend named by `[store] backend`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.path).await?)),
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}

/// Order neighbours by similarity, then by URL and chunk index for
/// deterministic ties, and keep the first `limit`.
pub(crate) fn rank_neighbors(mut neighbors: Vec<Neighbor>, limit: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.source_url().cmp(b.chunk.source_url()))
            .then_with(|| a.chunk.metadata.chunk_index.cmp(&b.chunk.metadata.chunk_index))
    });
    neighbors.truncate(limit);
    neighbors
}
