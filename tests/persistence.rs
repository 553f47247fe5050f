mod common;

use std::path::Path;
use std::sync::Arc;

use common::*;
use oran_nephio_rag::config::Config;
use oran_nephio_rag::error::RagError;
use oran_nephio_rag::llm::MockAdapter;
use oran_nephio_rag::models::RagState;
use oran_nephio_rag::rag::RagSystem;
use oran_nephio_rag::store::{open_store, VectorStore};

fn sqlite_config(db_path: &Path) -> Config {
    let mut config = test_config(vec![source("porch", &[PORCH_URL]), source("ric", &[RIC_URL])]);
    config.store.backend = "sqlite".to_string();
    config.store.path = db_path.to_path_buf();
    config
}

async fn sqlite_system(config: Config, fetcher: Arc<MapFetcher>) -> (RagSystem, Arc<dyn VectorStore>) {
    let store = open_store(&config.store).await.unwrap();
    let rag = system_with(config, fetcher, Arc::new(MockAdapter::new()), store.clone());
    (rag, store)
}

#[tokio::test]
async fn test_build_persists_across_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("data").join("rag.sqlite");

    let fetcher = docs_fetcher();
    let (chunks, ids) = {
        let (rag, store) = sqlite_system(sqlite_config(&db_path), fetcher.clone()).await;
        let report = rag.build_vector_database().await.unwrap();
        assert!(report.success);
        assert_eq!(report.documents_indexed, 2);
        let stats = store.stats().await.unwrap();
        (stats.chunks, store.chunk_ids(PORCH_URL).await.unwrap())
    };
    assert!(db_path.exists());
    let fetches_after_build = fetcher.calls();

    let (rag, store) = sqlite_system(sqlite_config(&db_path), fetcher.clone()).await;
    assert_eq!(rag.state().await, RagState::Uninitialized);
    rag.load_existing_database().await.unwrap();
    assert_eq!(rag.state().await, RagState::VectordbReady);
    rag.setup_qa_chain().await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, chunks);
    assert_eq!(stats.embedded, chunks);
    assert_eq!(store.chunk_ids(PORCH_URL).await.unwrap(), ids);

    let result = rag.query("How are package revisions published?").await.unwrap();
    assert!(result.success);
    assert_eq!(result.sources[0].url, PORCH_URL);

    // loading never refetches
    assert_eq!(fetcher.calls(), fetches_after_build);
}

#[tokio::test]
async fn test_status_reports_per_source_counts() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (rag, _store) = sqlite_system(sqlite_config(&tmp.path().join("rag.sqlite")), docs_fetcher()).await;
    rag.build_vector_database().await.unwrap();

    let status = rag.status().await.unwrap();
    assert_eq!(status.store_backend, "sqlite");
    assert_eq!(status.document_count, 2);
    assert_eq!(status.embedding_model, "hashing-256");
    assert_eq!(status.llm_provider, "mock");
    let names: Vec<&str> = status.sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["porch", "ric"]);
    assert!(status.sources.iter().all(|s| s.documents == 1 && s.chunks > 0));
    assert!(status.sources.iter().all(|s| s.last_fetched.is_some()));
    assert!(status.last_build.is_some());
}

#[tokio::test]
async fn test_load_from_empty_database_is_not_ready() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (rag, _store) = sqlite_system(sqlite_config(&tmp.path().join("empty.sqlite")), docs_fetcher()).await;

    assert!(matches!(
        rag.load_existing_database().await.unwrap_err(),
        RagError::StoreNotReady(_)
    ));
    assert_eq!(rag.state().await, RagState::Uninitialized);
}

#[tokio::test]
async fn test_update_after_restart_skips_unchanged_pages() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("rag.sqlite");
    let fetcher = docs_fetcher();

    {
        let (rag, _store) = sqlite_system(sqlite_config(&db_path), fetcher.clone()).await;
        rag.build_vector_database().await.unwrap();
    }

    let (rag, _store) = sqlite_system(sqlite_config(&db_path), fetcher).await;
    let report = rag.update_database().await.unwrap();
    assert!(report.success);
    assert_eq!(report.documents_unchanged, 2);
    assert_eq!(report.documents_indexed, 0);
    assert_eq!(report.chunks_indexed, 0);
    assert_eq!(rag.state().await, RagState::VectordbReady);
}

#[tokio::test]
async fn test_reopen_with_other_embedding_model_requires_rebuild() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("rag.sqlite");
    {
        let (rag, _store) = sqlite_system(sqlite_config(&db_path), docs_fetcher()).await;
        rag.build_vector_database().await.unwrap();
    }

    let config = sqlite_config(&db_path);
    let store = open_store(&config.store).await.unwrap();
    let rag = RagSystem::from_parts(
        config,
        oran_nephio_rag::rag::RagParts {
            fetcher: docs_fetcher(),
            embedder: Arc::new(oran_nephio_rag::embedding::HashingProvider::new(64)),
            adapter: Arc::new(MockAdapter::new()),
            store: store.clone(),
        },
    );
    assert!(matches!(
        rag.load_existing_database().await.unwrap_err(),
        RagError::StoreNotReady(_)
    ));
    assert_eq!(store.models().await.unwrap(), vec!["hashing-256".to_string()]);
}
