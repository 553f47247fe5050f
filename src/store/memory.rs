//! In-memory [`VectorStore`] implementation.
//!
//! Documents and records live in `HashMap`s behind a single
//! `std::sync::RwLock`, so a per-document replace is one critical section.
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{DocumentMetadata, SourceStats, StoreStats, VectorRecord};

use super::{rank_neighbors, Neighbor, VectorStore};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, DocumentMetadata>,
    records: HashMap<String, VectorRecord>,
}

impl Inner {
    fn remove_document_records(&mut self, source_url: &str) {
        self.records
            .retain(|_, r| r.chunk.source_url() != source_url);
    }
}

/// Volatile store for tests and `backend = "memory"`.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self) -> Result<bool> {
        Ok(!self.read()?.records.is_empty())
    }

    async fn replace_document(
        &self,
        document: &DocumentMetadata,
        records: &[VectorRecord],
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner.remove_document_records(&document.source_url);
        inner
            .documents
            .insert(document.source_url.clone(), document.clone());
        for record in records {
            inner
                .records
                .insert(record.chunk.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn remove_document(&self, source_url: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.remove_document_records(source_url);
        inner.documents.remove(source_url);
        Ok(())
    }

    async fn upsert_records(&self, records: &[VectorRecord]) -> Result<()> {
        let mut inner = self.write()?;
        for record in records {
            let document = &record.chunk.metadata.document;
            inner
                .documents
                .insert(document.source_url.clone(), document.clone());
            inner
                .records
                .insert(record.chunk.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn cached_embedding(
        &self,
        chunk_id: &str,
        model: &str,
        hash: &str,
    ) -> Result<Option<Vec<f32>>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .get(chunk_id)
            .filter(|r| r.model == model && r.chunk.hash == hash)
            .map(|r| r.embedding.clone()))
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let inner = self.read()?;
        let neighbors = inner
            .records
            .values()
            .map(|r| Neighbor {
                chunk: r.chunk.clone(),
                embedding: r.embedding.clone(),
                similarity: cosine_similarity(query, &r.embedding),
            })
            .collect();
        Ok(rank_neighbors(neighbors, limit))
    }

    async fn models(&self) -> Result<Vec<String>> {
        let inner = self.read()?;
        let models: BTreeSet<&str> = inner.records.values().map(|r| r.model.as_str()).collect();
        Ok(models.into_iter().map(str::to_string).collect())
    }

    async fn document_hashes(&self) -> Result<HashMap<String, String>> {
        let inner = self.read()?;
        Ok(inner
            .documents
            .iter()
            .map(|(url, meta)| (url.clone(), meta.content_hash.clone()))
            .collect())
    }

    async fn chunk_ids(&self, source_url: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let mut chunks: Vec<(i64, String)> = inner
            .records
            .values()
            .filter(|r| r.chunk.source_url() == source_url)
            .map(|r| (r.chunk.metadata.chunk_index, r.chunk.id.clone()))
            .collect();
        chunks.sort();
        Ok(chunks.into_iter().map(|(_, id)| id).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        let mut by_source: BTreeMap<String, SourceStats> = BTreeMap::new();

        for meta in inner.documents.values() {
            let entry = by_source
                .entry(meta.source_name.clone())
                .or_insert_with(|| SourceStats {
                    source: meta.source_name.clone(),
                    documents: 0,
                    chunks: 0,
                    last_fetched: None,
                });
            entry.documents += 1;
            entry.last_fetched = entry.last_fetched.max(Some(meta.fetched_at));
        }
        for record in inner.records.values() {
            if let Some(entry) = by_source.get_mut(&record.chunk.metadata.document.source_name) {
                entry.chunks += 1;
            }
        }

        Ok(StoreStats {
            documents: inner.documents.len() as i64,
            chunks: inner.records.len() as i64,
            embedded: inner.records.len() as i64,
            by_source: by_source.into_values().collect(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.documents.clear();
        inner.records.clear();
        Ok(())
    }
}
