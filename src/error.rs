//! Error taxonomy for the retrieval pipeline.
//!
//! Internal plumbing (SQLite, config parsing, HTTP clients) works in
//! `anyhow::Result` and converts into [`RagError::Internal`] at the public
//! boundary. The remaining variants are conditions callers are expected to
//! match on:
//!
//! | Variant | Scope | Policy |
//! |---------|-------|--------|
//! | [`Fetch`](RagError::Fetch) | one URL | skip, continue the build |
//! | [`ContentQuality`](RagError::ContentQuality) | one URL | skip, continue the build |
//! | [`StoreNotReady`](RagError::StoreNotReady) | one call | build or load first |
//! | [`NotReady`](RagError::NotReady) | one call | set up the QA chain first |
//! | [`Timeout`](RagError::Timeout) | one external call | retried for fetch/embedding |
//! | [`Adapter`](RagError::Adapter) | one query | degraded into a `QueryResult` |
//! | [`Embedding`](RagError::Embedding) | process | orchestrator enters `Degraded` |
//! | [`BuildInProgress`](RagError::BuildInProgress) | one call | retry later |

use thiserror::Error;

use crate::models::RagState;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("content from {url} too short: {bytes} bytes (minimum {min})")]
    ContentQuality { url: String, bytes: usize, min: usize },

    #[error("vector store not ready: {0}")]
    StoreNotReady(String),

    #[error("QA chain not ready (state: {0})")]
    NotReady(RagState),

    #[error("{operation} timed out after {secs:.1}s")]
    Timeout { operation: String, secs: f64 },

    #[error("LLM adapter error: {0}")]
    Adapter(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("a build is already in progress")]
    BuildInProgress,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    /// Whether the failure is worth retrying for idempotent calls
    /// (HTTP fetch, embedding).
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Timeout { .. } | RagError::Fetch { .. })
    }

    /// Machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Fetch { .. } => "fetch_error",
            RagError::ContentQuality { .. } => "content_quality",
            RagError::StoreNotReady(_) => "store_not_ready",
            RagError::NotReady(_) => "not_ready",
            RagError::Timeout { .. } => "timeout",
            RagError::Adapter(_) => "adapter_error",
            RagError::Embedding(_) => "embedding_error",
            RagError::BuildInProgress => "build_in_progress",
            RagError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Internal(err.into())
    }
}
