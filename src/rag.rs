//! Asynchronous RAG orchestrator.
//!
//! [`RagSystem`] owns the loader, the vector index, and (once set up) the
//! QA chain of retriever plus answer synthesizer. It drives the lifecycle:
//!
//! ```text
//! uninitialized ──build/load──▶ vectordb_ready ──setup_qa_chain──▶ qa_chain_ready ⇄ querying
//!        │                           │                                  │
//!        └───────────── unrecoverable dependency failure ──────────────┴──▶ degraded
//! ```
//!
//! A full build clears the store and rejects queries while it runs. An
//! incremental update replaces documents one at a time, so queries keep
//! being served from a consistent per-document view.
//!
//! # Concurrency
//!
//! All queries, single or batched, share one semaphore of
//! `max_concurrent_queries` permits, which bounds in-flight LLM adapter
//! calls. Only one build or update runs at a time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, instrument, warn};

use crate::chunk;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::fetch::{HttpFetcher, ReqwestFetcher};
use crate::index::VectorIndex;
use crate::llm::{create_adapter, LlmAdapter};
use crate::loader::DocumentLoader;
use crate::models::{BuildReport, Health, QueryResult, RagState, SystemStatus};
use crate::retriever::Retriever;
use crate::store::{open_store, VectorStore};
use crate::synth::AnswerSynthesizer;

/// Collaborators injected into [`RagSystem::from_parts`].
pub struct RagParts {
    pub fetcher: Arc<dyn HttpFetcher>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub adapter: Arc<dyn LlmAdapter>,
    pub store: Arc<dyn VectorStore>,
}

struct QaChain {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

pub struct RagSystem {
    config: Config,
    loader: DocumentLoader,
    index: Arc<VectorIndex>,
    adapter: Arc<dyn LlmAdapter>,
    chain: RwLock<Option<Arc<QaChain>>>,
    state: RwLock<RagState>,
    last_build: RwLock<Option<BuildReport>>,
    building: AtomicBool,
    in_flight: AtomicUsize,
    permits: Semaphore,
}

/// Clears the build flag on drop.
struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum BuildMode {
    Full,
    Incremental,
}

impl RagSystem {
    /// Build the default collaborators from configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(ReqwestFetcher::new(&config.loader.user_agent)?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let adapter = create_adapter(&config.llm)?;
        let store = open_store(&config.store).await?;
        Ok(Self::from_parts(
            config,
            RagParts {
                fetcher,
                embedder,
                adapter,
                store,
            },
        ))
    }

    pub fn from_parts(config: Config, parts: RagParts) -> Self {
        let loader = DocumentLoader::new(parts.fetcher, &config.loader);
        let index = Arc::new(VectorIndex::new(
            parts.store,
            parts.embedder,
            config.embedding.batch_size,
        ));
        let permits = Semaphore::new(config.concurrency.max_concurrent_queries.max(1));
        Self {
            config,
            loader,
            index,
            adapter: parts.adapter,
            chain: RwLock::new(None),
            state: RwLock::new(RagState::Uninitialized),
            last_build: RwLock::new(None),
            building: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            permits,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Current lifecycle state. `Querying` while any query is in flight.
    pub async fn state(&self) -> RagState {
        let state = *self.state.read().await;
        if state == RagState::QaChainReady && self.in_flight.load(Ordering::SeqCst) > 0 {
            RagState::Querying
        } else {
            state
        }
    }

    async fn set_state(&self, state: RagState) {
        *self.state.write().await = state;
    }

    /// State to enter once the store is ready again.
    async fn ready_state(&self) -> RagState {
        if self.chain.read().await.is_some() {
            RagState::QaChainReady
        } else {
            RagState::VectordbReady
        }
    }

    fn begin_build(&self) -> Result<BuildGuard<'_>> {
        self.building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RagError::BuildInProgress)?;
        Ok(BuildGuard(&self.building))
    }

    /// Fetch, chunk, embed, and store every enabled source from scratch.
    ///
    /// Per-URL failures are listed in the report; `success` is true when at
    /// least one document was indexed.
    ///
    /// # Errors
    ///
    /// [`RagError::BuildInProgress`] if another build or update is running;
    /// [`RagError::Embedding`] (state becomes `Degraded`) if the embedding
    /// provider fails.
    #[instrument(skip(self))]
    pub async fn build_vector_database(&self) -> Result<BuildReport> {
        let _guard = self.begin_build()?;
        self.set_state(RagState::VectordbBuilding).await;
        self.index.mark_not_ready();

        if let Err(e) = self.index.store().clear().await {
            self.set_state(RagState::Degraded).await;
            return Err(e.into());
        }

        self.run_build(BuildMode::Full).await
    }

    /// Re-index only documents whose content changed (or are new) since
    /// the last build. Unchanged documents keep their vectors, and queries
    /// continue to be served throughout.
    #[instrument(skip(self))]
    pub async fn update_database(&self) -> Result<BuildReport> {
        let _guard = self.begin_build()?;
        self.run_build(BuildMode::Incremental).await
    }

    async fn run_build(&self, mode: BuildMode) -> Result<BuildReport> {
        let started = Instant::now();
        let mut report = BuildReport::default();
        let known: HashMap<String, String> = match mode {
            BuildMode::Full => HashMap::new(),
            BuildMode::Incremental => {
                self.check_embedding_model().await?;
                match self.prune_unlisted_documents(&mut report).await {
                    Ok(hashes) => hashes,
                    Err(e) => {
                        self.set_state(RagState::Degraded).await;
                        return Err(e.into());
                    }
                }
            }
        };

        for source in self.config.enabled_sources() {
            let outcome = self.loader.load(source).await;
            report.failed.extend(outcome.failures);

            for doc in outcome.documents {
                if known.get(&doc.metadata.source_url) == Some(&doc.metadata.content_hash) {
                    report.documents_unchanged += 1;
                    continue;
                }

                let chunks =
                    chunk::split(&doc, self.config.chunking.chunk_size, self.config.chunking.overlap);
                match self.index.replace_document(&doc.metadata, &chunks).await {
                    Ok(n) => {
                        info!(
                            url = %doc.metadata.source_url,
                            source = %source.name,
                            chunks = n,
                            "indexed document"
                        );
                        report.documents_indexed += 1;
                        report.chunks_indexed += n;
                    }
                    Err(e) => {
                        warn!(error = %e, "vector store write failed, aborting build");
                        self.set_state(RagState::Degraded).await;
                        return Err(e);
                    }
                }
            }
        }

        report.elapsed_secs = started.elapsed().as_secs_f64();
        let has_data = match mode {
            BuildMode::Full => report.documents_indexed > 0,
            BuildMode::Incremental => self.index.store().exists().await.unwrap_or(false),
        };
        report.success = has_data;

        if has_data {
            self.index.mark_ready();
            let next = self.ready_state().await;
            self.set_state(next).await;
        } else if mode == BuildMode::Full {
            self.set_state(RagState::Uninitialized).await;
        }

        info!(
            documents = report.documents_indexed,
            unchanged = report.documents_unchanged,
            removed = report.documents_removed,
            chunks = report.chunks_indexed,
            failed = report.failed.len(),
            elapsed_secs = report.elapsed_secs,
            "build finished"
        );
        *self.last_build.write().await = Some(report.clone());
        Ok(report)
    }

    /// Remove stored documents whose URL no enabled source lists any more.
    /// Returns the content hashes of the documents that remain.
    async fn prune_unlisted_documents(
        &self,
        report: &mut BuildReport,
    ) -> anyhow::Result<HashMap<String, String>> {
        let store = self.index.store();
        let listed: HashSet<&str> = self
            .config
            .enabled_sources()
            .flat_map(|s| s.urls.iter().map(String::as_str))
            .collect();

        let mut hashes = store.document_hashes().await?;
        let unlisted: Vec<String> = hashes
            .keys()
            .filter(|url| !listed.contains(url.as_str()))
            .cloned()
            .collect();
        for url in unlisted {
            store.remove_document(&url).await?;
            hashes.remove(&url);
            report.documents_removed += 1;
            info!(url = %url, "removed document no longer listed by an enabled source");
        }
        Ok(hashes)
    }

    /// Persisted vectors must come from the active embedding model.
    async fn check_embedding_model(&self) -> Result<()> {
        let active = self.index.embedder().model_name();
        let stored = self.index.store().models().await?;
        match stored.iter().find(|m| m.as_str() != active) {
            Some(other) => Err(RagError::StoreNotReady(format!(
                "index built with model {}, config uses {}; run a full build",
                other, active
            ))),
            None => Ok(()),
        }
    }

    /// Attach to a previously persisted vector store.
    ///
    /// # Errors
    ///
    /// [`RagError::StoreNotReady`] if the store is empty or was built with a
    /// different embedding model.
    pub async fn load_existing_database(&self) -> Result<()> {
        if self.building.load(Ordering::SeqCst) {
            return Err(RagError::BuildInProgress);
        }
        if !self.index.store().exists().await? {
            return Err(RagError::StoreNotReady(format!(
                "no persisted vector database found ({} backend)",
                self.index.store().backend()
            )));
        }
        self.check_embedding_model().await?;
        self.index.mark_ready();
        let next = self.ready_state().await;
        self.set_state(next).await;
        info!(backend = self.index.store().backend(), "loaded existing vector database");
        Ok(())
    }

    /// Bind retriever, synthesizer, and LLM adapter. Requires a ready store.
    pub async fn setup_qa_chain(&self) -> Result<()> {
        if !self.index.is_ready() {
            return Err(RagError::StoreNotReady(
                "build or load the vector database before setting up the QA chain".to_string(),
            ));
        }
        let chain = QaChain {
            retriever: Retriever::new(self.index.clone(), self.config.retrieval.clone()),
            synthesizer: AnswerSynthesizer::new(self.adapter.clone(), &self.config.llm),
        };
        *self.chain.write().await = Some(Arc::new(chain));
        self.set_state(RagState::QaChainReady).await;
        info!(adapter = self.adapter.name(), "QA chain ready");
        Ok(())
    }

    async fn ready_chain(&self) -> Result<Arc<QaChain>> {
        let state = *self.state.read().await;
        if state != RagState::QaChainReady {
            return Err(RagError::NotReady(state));
        }
        self.chain
            .read()
            .await
            .clone()
            .ok_or(RagError::NotReady(state))
    }

    /// Answer one question.
    ///
    /// # Errors
    ///
    /// Only [`RagError::NotReady`]. Retrieval and adapter failures are
    /// reported inside the returned [`QueryResult`].
    #[instrument(skip(self))]
    pub async fn query(&self, question: &str) -> Result<QueryResult> {
        let chain = self.ready_chain().await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RagError::Internal(e.into()))?;
        let _in_flight = InFlightGuard::enter(&self.in_flight);

        let started = Instant::now();
        let mut result = match chain.retriever.retrieve(question).await {
            Ok(context) => chain.synthesizer.answer(question, &context).await,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                QueryResult::failed(question, format!("Retrieval failed: {}", e))
            }
        };
        result.query_time = started.elapsed().as_secs_f64();
        Ok(result)
    }

    /// Answer several questions concurrently, bounded by
    /// `max_concurrent_queries`. Results are in input order; a failing
    /// question yields a failed result in its slot.
    pub async fn batch_query(&self, questions: &[String]) -> Result<Vec<QueryResult>> {
        self.ready_chain().await?;
        let tasks = questions.iter().map(|question| async move {
            match self.query(question).await {
                Ok(result) => result,
                Err(e) => QueryResult::failed(question, e.to_string()),
            }
        });
        Ok(join_all(tasks).await)
    }

    pub async fn health(&self) -> Health {
        let state = self.state().await;
        Health {
            vectordb_ready: self.index.is_ready(),
            qa_chain_ready: matches!(state, RagState::QaChainReady | RagState::Querying),
            state,
        }
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        let health = self.health().await;
        let stats = self.index.store().stats().await?;
        Ok(SystemStatus {
            state: health.state,
            vectordb_ready: health.vectordb_ready,
            qa_chain_ready: health.qa_chain_ready,
            document_count: stats.documents,
            chunk_count: stats.chunks,
            embedded_count: stats.embedded,
            embedding_model: self.index.embedder().model_name().to_string(),
            llm_provider: self.adapter.name().to_string(),
            store_backend: self.index.store().backend().to_string(),
            sources: stats.by_source,
            last_build: self.last_build.read().await.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::embedding::HashingProvider;
    use crate::fetch::HttpResponse;
    use crate::llm::MockAdapter;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct PageFetcher {
        body: String,
    }

    #[async_trait]
    impl HttpFetcher for PageFetcher {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                body: self.body.clone(),
            })
        }
    }

    fn system() -> RagSystem {
        let mut config = Config::parse("").unwrap();
        config.sources = vec![SourceConfig {
            name: "docs".to_string(),
            urls: vec!["https://docs.nephio.org/docs/".to_string()],
            enabled: true,
            source_type: "nephio".to_string(),
            description: String::new(),
        }];
        let body = format!(
            "<html><head><title>Nephio</title></head><body><main><p>{}</p></main></body></html>",
            "Nephio automates network functions with kpt packages. ".repeat(20)
        );
        RagSystem::from_parts(
            config,
            RagParts {
                fetcher: Arc::new(PageFetcher { body }),
                embedder: Arc::new(HashingProvider::new(64)),
                adapter: Arc::new(MockAdapter::new()),
                store: Arc::new(InMemoryStore::new()),
            },
        )
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let rag = system();
        assert_eq!(rag.state().await, RagState::Uninitialized);
        assert!(matches!(
            rag.query("q").await.unwrap_err(),
            RagError::NotReady(RagState::Uninitialized)
        ));
        assert!(matches!(
            rag.setup_qa_chain().await.unwrap_err(),
            RagError::StoreNotReady(_)
        ));

        let report = rag.build_vector_database().await.unwrap();
        assert!(report.success);
        assert_eq!(rag.state().await, RagState::VectordbReady);
        assert!(matches!(
            rag.query("q").await.unwrap_err(),
            RagError::NotReady(RagState::VectordbReady)
        ));

        rag.setup_qa_chain().await.unwrap();
        let health = rag.health().await;
        assert!(health.vectordb_ready && health.qa_chain_ready);
        assert_eq!(health.state, RagState::QaChainReady);

        let result = rag.query("What does Nephio automate?").await.unwrap();
        assert!(result.success);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(rag.state().await, RagState::QaChainReady);
    }

    #[tokio::test]
    async fn test_load_existing_requires_data() {
        let rag = system();
        assert!(matches!(
            rag.load_existing_database().await.unwrap_err(),
            RagError::StoreNotReady(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_build_rejected() {
        let rag = system();
        let _guard = rag.begin_build().unwrap();
        assert!(matches!(
            rag.build_vector_database().await.unwrap_err(),
            RagError::BuildInProgress
        ));
        assert!(matches!(
            rag.update_database().await.unwrap_err(),
            RagError::BuildInProgress
        ));
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let rag = system();
        rag.build_vector_database().await.unwrap();
        let status = rag.status().await.unwrap();
        assert_eq!(status.document_count, 1);
        assert!(status.chunk_count >= 1);
        assert_eq!(status.embedding_model, "hashing-64");
        assert_eq!(status.llm_provider, "mock");
        assert_eq!(status.store_backend, "memory");
        assert!(status.last_build.is_some());
    }
}
