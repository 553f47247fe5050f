mod common;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use oran_nephio_rag::embedding::EmbeddingProvider;
use oran_nephio_rag::error::{RagError, Result};
use oran_nephio_rag::fetch::{HttpFetcher, HttpResponse};
use oran_nephio_rag::llm::{LlmAdapter, LlmResponse, MockAdapter};
use oran_nephio_rag::models::RagState;
use oran_nephio_rag::rag::{RagParts, RagSystem};
use oran_nephio_rag::store::{InMemoryStore, VectorStore};
use oran_nephio_rag::synth::NO_CONTEXT_ANSWER;

async fn ready(rag: &RagSystem) {
    let report = rag.build_vector_database().await.unwrap();
    assert!(report.success);
    rag.setup_qa_chain().await.unwrap();
}

async fn all_chunk_ids(store: &dyn VectorStore, urls: &[&str]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for url in urls {
        ids.extend(store.chunk_ids(url).await.unwrap());
    }
    ids
}

#[tokio::test]
async fn test_end_to_end_single_source() {
    let fetcher = docs_fetcher();
    let rag = system(test_config(vec![source("porch", &[PORCH_URL])]), fetcher);
    ready(&rag).await;

    let result = rag.query("what is covered by this source?").await.unwrap();
    assert!(result.success);
    assert!(!result.answer.is_empty());
    let urls: Vec<&str> = result.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, vec![PORCH_URL]);
    assert_eq!(result.sources[0].title, "Porch");
    assert!(result.query_time >= 0.0);
}

#[tokio::test]
async fn test_retrieval_prefers_matching_source() {
    let rag = system(
        test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]),
        docs_fetcher(),
    );
    ready(&rag).await;

    let result = rag
        .query("Which xApps run on the near real-time RIC?")
        .await
        .unwrap();
    assert_eq!(result.sources[0].url, RIC_URL);
}

#[tokio::test]
async fn test_partial_failure_build() {
    let fetcher = docs_fetcher();
    fetcher.set(RIC_URL, 500, "internal error");
    let store = Arc::new(InMemoryStore::new());
    let rag = system_with(
        test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]),
        fetcher,
        Arc::new(MockAdapter::new()),
        store.clone(),
    );

    let report = rag.build_vector_database().await.unwrap();
    assert!(report.success);
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].url, RIC_URL);
    assert_eq!(report.failed[0].source, "ric");

    let hashes = store.document_hashes().await.unwrap();
    assert!(hashes.contains_key(PORCH_URL));
    assert!(!hashes.contains_key(RIC_URL));
    assert!(store.chunk_ids(RIC_URL).await.unwrap().is_empty());
    assert_eq!(
        store.chunk_ids(PORCH_URL).await.unwrap().len(),
        report.chunks_indexed
    );
}

#[tokio::test]
async fn test_all_sources_failing_is_unsuccessful() {
    let fetcher = Arc::new(MapFetcher::new());
    let rag = system(test_config(vec![source("porch", &[PORCH_URL])]), fetcher);
    let report = rag.build_vector_database().await.unwrap();
    assert!(!report.success);
    assert_eq!(rag.state().await, RagState::Uninitialized);
    assert!(matches!(
        rag.setup_qa_chain().await.unwrap_err(),
        RagError::StoreNotReady(_)
    ));
}

#[tokio::test]
async fn test_short_page_rejected_by_quality_gate() {
    let fetcher = docs_fetcher();
    fetcher.set(RIC_URL, 200, page("Stub", &["Coming soon."]));
    let rag = system(
        test_config(vec![source("docs", &[PORCH_URL, RIC_URL])]),
        fetcher,
    );
    let report = rag.build_vector_database().await.unwrap();
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("too short"));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let rag = system_with(
        test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]),
        docs_fetcher(),
        Arc::new(MockAdapter::new()),
        store.clone(),
    );

    let first = rag.build_vector_database().await.unwrap();
    let ids_first = all_chunk_ids(store.as_ref(), &[PORCH_URL, RIC_URL]).await;
    let count_first = store.stats().await.unwrap().embedded;

    let second = rag.build_vector_database().await.unwrap();
    let ids_second = all_chunk_ids(store.as_ref(), &[PORCH_URL, RIC_URL]).await;

    assert_eq!(first.chunks_indexed, second.chunks_indexed);
    assert_eq!(ids_first, ids_second);
    assert_eq!(count_first, store.stats().await.unwrap().embedded);
    assert_eq!(count_first as usize, ids_first.len());
}

#[tokio::test]
async fn test_incremental_update_only_touches_changed_pages() {
    let fetcher = docs_fetcher();
    let store = Arc::new(InMemoryStore::new());
    let rag = system_with(
        test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]),
        fetcher.clone(),
        Arc::new(MockAdapter::new()),
        store.clone(),
    );
    ready(&rag).await;

    let porch_ids = store.chunk_ids(PORCH_URL).await.unwrap();
    let ric_hash_before = store.document_hashes().await.unwrap()[RIC_URL].clone();

    fetcher.set(
        RIC_URL,
        200,
        page(
            "Near-RT RIC",
            &[
                "The near real-time RIC now documents the A1 policy interface used by the non-real-time RIC to steer xApps.",
                "A1 policies carry intents such as traffic steering objectives and are enforced by xApps through E2 control messages.",
            ],
        ),
    );

    let report = rag.update_database().await.unwrap();
    assert!(report.success);
    assert_eq!(report.documents_unchanged, 1);
    assert_eq!(report.documents_indexed, 1);

    assert_eq!(store.chunk_ids(PORCH_URL).await.unwrap(), porch_ids);
    let ric_hash_after = store.document_hashes().await.unwrap()[RIC_URL].clone();
    assert_ne!(ric_hash_before, ric_hash_after);

    // queries keep working after an update
    assert_eq!(rag.state().await, RagState::QaChainReady);
    let result = rag.query("What is the A1 policy interface?").await.unwrap();
    assert_eq!(result.sources[0].url, RIC_URL);
}

/// Fails any prompt mentioning "explode".
struct SelectiveAdapter;

#[async_trait]
impl LlmAdapter for SelectiveAdapter {
    fn name(&self) -> &str {
        "selective"
    }
    async fn query(&self, prompt: &str) -> LlmResponse {
        if prompt.contains("explode") {
            LlmResponse::failed("adapter crashed", 0.0)
        } else {
            LlmResponse::ok("fine", 0.0)
        }
    }
}

#[tokio::test]
async fn test_batch_query_order_and_isolation() {
    let rag = system_with(
        test_config(vec![source("porch", &[PORCH_URL])]),
        docs_fetcher(),
        Arc::new(SelectiveAdapter),
        Arc::new(InMemoryStore::new()),
    );
    ready(&rag).await;

    let questions = vec![
        "Q1 what is porch?".to_string(),
        "Q2 please explode".to_string(),
        "Q3 what are package revisions?".to_string(),
    ];
    let results = rag.batch_query(&questions).await.unwrap();
    assert_eq!(results.len(), 3);
    for (q, r) in questions.iter().zip(&results) {
        assert_eq!(&r.question, q);
    }
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1].answer.contains("adapter crashed"));
    assert!(results[2].success);
}

/// Records the peak number of concurrent calls.
#[derive(Default)]
struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl LlmAdapter for ConcurrencyProbe {
    fn name(&self) -> &str {
        "probe"
    }
    async fn query(&self, _prompt: &str) -> LlmResponse {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        LlmResponse::ok("answer", 0.05)
    }
}

#[tokio::test]
async fn test_batch_query_respects_concurrency_cap() {
    let mut config = test_config(vec![source("porch", &[PORCH_URL])]);
    config.concurrency.max_concurrent_queries = 2;
    let probe = Arc::new(ConcurrencyProbe::default());
    let rag = system_with(
        config,
        docs_fetcher(),
        probe.clone(),
        Arc::new(InMemoryStore::new()),
    );
    ready(&rag).await;

    let questions: Vec<String> = (0..6).map(|i| format!("question {} about porch", i)).collect();
    let results = rag.batch_query(&questions).await.unwrap();
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.success));
    let peak = probe.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {}", peak);
}

struct HangingAdapter;

#[async_trait]
impl LlmAdapter for HangingAdapter {
    fn name(&self) -> &str {
        "hanging"
    }
    async fn query(&self, _prompt: &str) -> LlmResponse {
        tokio::time::sleep(Duration::from_secs(60)).await;
        LlmResponse::ok("never", 60.0)
    }
}

#[tokio::test]
async fn test_llm_timeout_returns_bounded_degraded_answer() {
    let mut config = test_config(vec![source("porch", &[PORCH_URL])]);
    config.llm.timeout_secs = 0.3;
    let rag = system_with(
        config,
        docs_fetcher(),
        Arc::new(HangingAdapter),
        Arc::new(InMemoryStore::new()),
    );
    ready(&rag).await;

    let started = Instant::now();
    let result = rag.query("what is porch?").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.success);
    assert!(result.answer.contains("timeout"));
}

#[tokio::test]
async fn test_threshold_above_best_score_yields_no_context_answer() {
    let mut config = test_config(vec![source("porch", &[PORCH_URL])]);
    config.retrieval.score_threshold = Some(0.999);
    let rag = system(config, docs_fetcher());
    ready(&rag).await;

    let result = rag.query("zebra giraffe xylophone").await.unwrap();
    assert_eq!(result.answer, NO_CONTEXT_ANSWER);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn test_query_before_setup_is_not_ready() {
    let rag = system(test_config(vec![source("porch", &[PORCH_URL])]), docs_fetcher());
    assert!(matches!(
        rag.query("anything").await.unwrap_err(),
        RagError::NotReady(RagState::Uninitialized)
    ));
    assert!(matches!(
        rag.batch_query(&["a".to_string()]).await.unwrap_err(),
        RagError::NotReady(_)
    ));
}

struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed_many(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn test_embedding_failure_degrades_system() {
    let rag = RagSystem::from_parts(
        test_config(vec![source("porch", &[PORCH_URL])]),
        RagParts {
            fetcher: docs_fetcher(),
            embedder: Arc::new(BrokenEmbedder),
            adapter: Arc::new(MockAdapter::new()),
            store: Arc::new(InMemoryStore::new()),
        },
    );

    let err = rag.build_vector_database().await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
    assert_eq!(rag.state().await, RagState::Degraded);
    assert!(matches!(
        rag.query("q").await.unwrap_err(),
        RagError::NotReady(RagState::Degraded)
    ));
}

/// Holds every GET until released, once armed.
struct GatedFetcher {
    inner: Arc<MapFetcher>,
    armed: AtomicBool,
    gate: tokio::sync::Semaphore,
}

#[async_trait]
impl HttpFetcher for GatedFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        if self.armed.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await.unwrap();
        }
        self.inner.get(url, timeout).await
    }
}

#[tokio::test]
async fn test_full_build_blocks_queries_and_concurrent_builds() {
    let fetcher = Arc::new(GatedFetcher {
        inner: docs_fetcher(),
        armed: AtomicBool::new(false),
        gate: tokio::sync::Semaphore::new(0),
    });
    let rag = Arc::new(RagSystem::from_parts(
        test_config(vec![source("porch", &[PORCH_URL])]),
        RagParts {
            fetcher: fetcher.clone(),
            embedder: Arc::new(oran_nephio_rag::embedding::HashingProvider::new(64)),
            adapter: Arc::new(MockAdapter::new()),
            store: Arc::new(InMemoryStore::new()),
        },
    ));
    ready(&rag).await;

    fetcher.armed.store(true, Ordering::SeqCst);
    let building = {
        let rag = rag.clone();
        tokio::spawn(async move { rag.build_vector_database().await })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while rag.state().await != RagState::VectordbBuilding {
        assert!(Instant::now() < deadline, "build never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(matches!(
        rag.query("what is porch?").await.unwrap_err(),
        RagError::NotReady(RagState::VectordbBuilding)
    ));
    assert!(matches!(
        rag.build_vector_database().await.unwrap_err(),
        RagError::BuildInProgress
    ));

    fetcher.gate.add_permits(100);
    let report = building.await.unwrap().unwrap();
    assert!(report.success);
    assert_eq!(rag.state().await, RagState::QaChainReady);
    assert!(rag.query("what is porch?").await.unwrap().success);
}

#[tokio::test]
async fn test_update_drops_documents_of_disabled_sources() {
    let fetcher = docs_fetcher();
    let store = Arc::new(InMemoryStore::new());
    let first = system_with(
        test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]),
        fetcher.clone(),
        Arc::new(MockAdapter::new()),
        store.clone(),
    );
    first.build_vector_database().await.unwrap();
    let porch_ids = store.chunk_ids(PORCH_URL).await.unwrap();
    assert!(!store.chunk_ids(RIC_URL).await.unwrap().is_empty());

    // porch stays configured but is unreachable during the update
    fetcher.set(PORCH_URL, 503, "maintenance");
    let mut ric = source("ric", &[RIC_URL]);
    ric.enabled = false;
    let second = system_with(
        test_config(vec![source("porch", &[PORCH_URL]), ric]),
        fetcher,
        Arc::new(MockAdapter::new()),
        store.clone(),
    );
    let report = second.update_database().await.unwrap();
    assert!(report.success);
    assert_eq!(report.documents_removed, 1);
    assert_eq!(report.failed.len(), 1);

    assert!(store.chunk_ids(RIC_URL).await.unwrap().is_empty());
    let hashes = store.document_hashes().await.unwrap();
    assert!(!hashes.contains_key(RIC_URL));
    assert_eq!(store.chunk_ids(PORCH_URL).await.unwrap(), porch_ids);

    second.setup_qa_chain().await.unwrap();
    let result = second.query("Which xApps run on the near real-time RIC?").await.unwrap();
    assert!(result.sources.iter().all(|s| s.url == PORCH_URL));
}

#[tokio::test]
async fn test_store_from_other_embedding_model_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let config = test_config(vec![source("porch", &[PORCH_URL])]);
    let built = system_with(
        config.clone(),
        docs_fetcher(),
        Arc::new(MockAdapter::new()),
        store.clone(),
    );
    built.build_vector_database().await.unwrap();

    let rag = RagSystem::from_parts(
        config,
        RagParts {
            fetcher: docs_fetcher(),
            embedder: Arc::new(oran_nephio_rag::embedding::HashingProvider::new(64)),
            adapter: Arc::new(MockAdapter::new()),
            store: store.clone(),
        },
    );

    match rag.load_existing_database().await.unwrap_err() {
        RagError::StoreNotReady(message) => {
            assert!(message.contains("hashing-256"), "{}", message);
            assert!(message.contains("hashing-64"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!rag.index().is_ready());
    assert!(matches!(
        rag.update_database().await.unwrap_err(),
        RagError::StoreNotReady(_)
    ));

    // a full build re-embeds with the active model
    rag.build_vector_database().await.unwrap();
    assert_eq!(store.models().await.unwrap(), vec!["hashing-64".to_string()]);
    rag.load_existing_database().await.unwrap();
}
