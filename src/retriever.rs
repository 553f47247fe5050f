//! Question → context chunks.
//!
//! Asks the index for the whole re-ranked `fetch_k` pool, then caps how
//! many chunks a single source URL may contribute so one long page cannot
//! crowd out the rest of the context.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::{SearchParams, VectorIndex};
use crate::models::ScoredChunk;

pub struct Retriever {
    index: Arc<VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// At most `k` chunks, at most `max_chunks_per_source` per URL, in
    /// ranking order.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let params = SearchParams {
            k: self.config.fetch_k.max(self.config.k),
            fetch_k: self.config.fetch_k,
            diversity_lambda: Some(self.config.diversity_lambda),
            score_threshold: self.config.score_threshold,
        };
        let ranked = self.index.similarity_search(question, &params).await?;
        Ok(cap_per_source(
            ranked,
            self.config.max_chunks_per_source,
            self.config.k,
        ))
    }
}

/// Keep at most `per_source` chunks per source URL (first-seen order),
/// then truncate to `k`.
pub fn cap_per_source(ranked: Vec<ScoredChunk>, per_source: usize, k: usize) -> Vec<ScoredChunk> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    ranked
        .into_iter()
        .filter(|hit| {
            let count = counts.entry(hit.chunk.source_url().to_string()).or_insert(0);
            *count += 1;
            *count <= per_source
        })
        .take(k)
        .collect()
}
