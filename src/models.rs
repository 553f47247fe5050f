//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, and answers that flow
//! through the build (fetch → chunk → embed → store) and query
//! (retrieve → synthesize) paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata attached to a fetched document and inherited by its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_url: String,
    pub title: String,
    /// Name of the [`SourceConfig`](crate::config::SourceConfig) this URL belongs to.
    pub source_name: String,
    /// Source tag (e.g. `"nephio"`, `"oran_sc"`).
    pub source_type: String,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of the normalized content, used for incremental updates.
    pub content_hash: String,
}

/// Normalized text of one fetched page that passed the quality gate.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Metadata of a single chunk: the parent document's metadata plus position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    pub chunk_index: i64,
}

/// A bounded slice of a document's text prepared for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic UUIDv5 of `"{source_url}#{chunk_index}"`.
    pub id: String,
    pub text: String,
    /// SHA-256 of `text`; embedding cache key.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn source_url(&self) -> &str {
        &self.metadata.document.source_url
    }
}

/// Persisted form of a [`Chunk`] inside a vector store.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub model: String,
}

/// A search hit with a relevance score in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Source attribution attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
    pub content_preview: String,
}

/// Answer to one question. Produced per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Wall-clock seconds for retrieval plus synthesis.
    pub query_time: f64,
    /// `false` when `answer` explains a failure instead of answering.
    pub success: bool,
}

impl QueryResult {
    /// A result whose answer explains why the question could not be answered.
    pub fn failed(question: &str, message: impl Into<String>) -> Self {
        Self {
            question: question.to_string(),
            answer: message.into(),
            sources: Vec::new(),
            query_time: 0.0,
            success: false,
        }
    }
}

/// One URL that could not be indexed during a build or update.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub url: String,
    pub reason: String,
}

/// Outcome of `build_vector_database` / `update_database`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// `true` when at least one document is indexed (partial coverage counts).
    pub success: bool,
    pub documents_indexed: usize,
    /// Documents skipped by an update because their content hash is unchanged.
    pub documents_unchanged: usize,
    /// Documents dropped by an update because no enabled source lists them.
    pub documents_removed: usize,
    pub chunks_indexed: usize,
    pub failed: Vec<SourceFailure>,
    pub elapsed_secs: f64,
}

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagState {
    Uninitialized,
    VectordbBuilding,
    VectordbReady,
    QaChainReady,
    Querying,
    Degraded,
}

impl fmt::Display for RagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RagState::Uninitialized => "uninitialized",
            RagState::VectordbBuilding => "vectordb_building",
            RagState::VectordbReady => "vectordb_ready",
            RagState::QaChainReady => "qa_chain_ready",
            RagState::Querying => "querying",
            RagState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Readiness flags for the `health()` surface.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub vectordb_ready: bool,
    pub qa_chain_ready: bool,
    pub state: RagState,
}

/// Per-source breakdown reported by a vector store.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub documents: i64,
    pub chunks: i64,
    pub last_fetched: Option<DateTime<Utc>>,
}

/// Counts reported by a vector store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub by_source: Vec<SourceStats>,
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub state: RagState,
    pub vectordb_ready: bool,
    pub qa_chain_ready: bool,
    pub document_count: i64,
    pub chunk_count: i64,
    pub embedded_count: i64,
    pub embedding_model: String,
    pub llm_provider: String,
    pub store_backend: String,
    pub sources: Vec<SourceStats>,
    pub last_build: Option<BuildReport>,
}
