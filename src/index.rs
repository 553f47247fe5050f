//! Embedded vector index: chunk embedding, persistence, and MMR search.
//!
//! [`VectorIndex`] couples an [`EmbeddingProvider`] with a [`VectorStore`].
//! Writes embed chunk text (reusing cached vectors for unchanged chunks)
//! and persist the resulting [`VectorRecord`]s. Searches embed the query,
//! fetch nearest neighbours, and optionally re-rank them with maximal
//! marginal relevance.
//!
//! # Scores
//!
//! Cosine similarity is mapped onto `[0.0, 1.0]` with `(cos + 1) / 2`,
//! so a score of `1.0` is an identical direction and `0.5` is orthogonal.
//! The same mapping is used for candidate-to-candidate similarity in MMR.
//!
//! # MMR
//!
//! Given relevance `rel(c)` and the already-selected set `S`, each step
//! picks the candidate maximizing
//!
//! ```text
//! λ · rel(c) − (1 − λ) · max_{s ∈ S} sim(c, s)
//! ```
//!
//! `λ = 1.0` reduces to plain relevance ranking; smaller values trade
//! relevance for coverage of different passages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::{Chunk, DocumentMetadata, ScoredChunk, VectorRecord};
use crate::store::VectorStore;

/// Parameters of one [`VectorIndex::similarity_search`] call.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub k: usize,
    /// Size of the nearest-neighbour pool considered before re-ranking.
    pub fetch_k: usize,
    /// `Some(λ)` enables MMR re-ranking; `None` returns plain top-k.
    pub diversity_lambda: Option<f64>,
    /// Candidates scoring below this are discarded before selection.
    pub score_threshold: Option<f64>,
}

impl SearchParams {
    pub fn top_k(k: usize) -> Self {
        Self {
            k,
            fetch_k: k,
            diversity_lambda: None,
            score_threshold: None,
        }
    }
}

/// Map cosine similarity onto `[0.0, 1.0]`.
pub fn to_score(cosine: f32) -> f64 {
    ((f64::from(cosine) + 1.0) / 2.0).clamp(0.0, 1.0)
}

pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    ready: AtomicBool,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
            ready: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Allow searches. Called once the store holds a built or loaded index.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Embed and persist `chunks`, replacing records with the same id.
    /// Returns the number of records written.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        let records = self.embed_chunks(chunks).await?;
        self.store.upsert_records(&records).await?;
        Ok(records.len())
    }

    /// Embed `chunks` and atomically replace every record of `document`.
    pub async fn replace_document(
        &self,
        document: &DocumentMetadata,
        chunks: &[Chunk],
    ) -> Result<usize> {
        let records = self.embed_chunks(chunks).await?;
        self.store.replace_document(document, &records).await?;
        Ok(records.len())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<VectorRecord>> {
        let model = self.embedder.model_name().to_string();
        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut misses = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let cached = self
                .store
                .cached_embedding(&chunk.id, &model, &chunk.hash)
                .await?;
            if cached.is_none() {
                misses.push(i);
            }
            embeddings.push(cached);
        }

        if !misses.is_empty() {
            debug!(
                cached = chunks.len() - misses.len(),
                embedding = misses.len(),
                model = %model,
                "embedding chunks"
            );
        }

        for batch in misses.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
            let vectors = self
                .embedder
                .embed_many(&texts)
                .await
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
            if vectors.len() != texts.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (&i, vector) in batch.iter().zip(vectors) {
                embeddings[i] = Some(vector);
            }
        }

        chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let embedding = embedding.ok_or_else(|| {
                    RagError::Embedding(format!("missing embedding for chunk {}", chunk.id))
                })?;
                Ok(VectorRecord {
                    chunk: chunk.clone(),
                    embedding,
                    model: model.clone(),
                })
            })
            .collect()
    }

    /// Search for chunks relevant to `query`.
    ///
    /// Never returns more than `params.k` results. A threshold above the
    /// best score yields an empty list, not an error.
    ///
    /// # Errors
    ///
    /// [`RagError::StoreNotReady`] before [`mark_ready`](Self::mark_ready);
    /// [`RagError::Embedding`] if the query cannot be embedded.
    pub async fn similarity_search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.is_ready() {
            return Err(RagError::StoreNotReady(
                "vector database has not been built or loaded".to_string(),
            ));
        }
        if params.k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let pool = params.fetch_k.max(params.k);
        let mut candidates = self.store.nearest(&query_vec, pool).await?;
        if let Some(threshold) = params.score_threshold {
            candidates.retain(|n| to_score(n.similarity) >= threshold);
        }

        let relevance: Vec<f64> = candidates.iter().map(|n| to_score(n.similarity)).collect();
        let order = match params.diversity_lambda {
            Some(lambda) => {
                let vectors: Vec<&[f32]> =
                    candidates.iter().map(|n| n.embedding.as_slice()).collect();
                mmr_select(&relevance, &vectors, params.k, lambda)
            }
            None => (0..candidates.len().min(params.k)).collect(),
        };

        let mut slots: Vec<Option<_>> = candidates.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| {
                slots[i].take().map(|n| ScoredChunk {
                    chunk: n.chunk,
                    score: relevance[i],
                })
            })
            .collect())
    }
}

/// Greedy maximal-marginal-relevance selection.
///
/// Returns up to `k` indices into `relevance`/`vectors`, in selection order.
/// Ties go to the candidate listed first (the more relevant one).
pub fn mmr_select(relevance: &[f64], vectors: &[&[f32]], k: usize, lambda: f64) -> Vec<usize> {
    let n = relevance.len().min(vectors.len());
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(n));
    // max similarity of each candidate to anything selected so far
    let mut redundancy = vec![0.0f64; n];
    let mut taken = vec![false; n];

    while selected.len() < k.min(n) {
        let mut best: Option<(usize, f64)> = None;
        for c in (0..n).filter(|&c| !taken[c]) {
            let mmr = lambda * relevance[c] - (1.0 - lambda) * redundancy[c];
            if best.map_or(true, |(_, b)| mmr > b) {
                best = Some((c, mmr));
            }
        }
        let Some((pick, _)) = best else { break };

        taken[pick] = true;
        selected.push(pick);
        for c in (0..n).filter(|&c| !taken[c]) {
            let sim = to_score(cosine_similarity(vectors[c], vectors[pick]));
            if sim > redundancy[c] {
                redundancy[c] = sim;
            }
        }
    }

    selected
}
