#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oran_nephio_rag::config::{Config, SourceConfig};
use oran_nephio_rag::embedding::HashingProvider;
use oran_nephio_rag::error::Result;
use oran_nephio_rag::fetch::{HttpFetcher, HttpResponse};
use oran_nephio_rag::llm::{LlmAdapter, MockAdapter};
use oran_nephio_rag::rag::{RagParts, RagSystem};
use oran_nephio_rag::store::{InMemoryStore, VectorStore};

pub const PORCH_URL: &str = "https://docs.nephio.org/docs/porch/";
pub const RIC_URL: &str = "https://docs.o-ran-sc.org/en/latest/ric/";

/// A documentation-like HTML page with site chrome around the content.
pub fn page(title: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect();
    format!(
        "<html><head><title>{title}</title><script>var x = 1;</script></head>\
         <body><nav>Home | Docs | Blog</nav><main><h1>{title}</h1>{body}</main>\
         <footer>Copyright The Linux Foundation</footer></body></html>"
    )
}

pub fn porch_page() -> String {
    page(
        "Porch",
        &[
            "Porch is the package orchestration server of Nephio. It manages kpt package revisions stored in git repositories.",
            "Package revisions move through draft, proposed, and published lifecycle stages before ConfigSync applies them to workload clusters.",
            "Porch exposes its API as Kubernetes custom resources so that controllers can create, clone, and update packages.",
        ],
    )
}

pub fn ric_page() -> String {
    page(
        "Near-RT RIC",
        &[
            "The near real-time RAN intelligent controller hosts xApps that optimize radio resources with control loops between ten milliseconds and one second.",
            "xApps subscribe to E2 nodes through the E2 termination and use the shared data layer to exchange state.",
            "The O-RAN Software Community publishes reference implementations of the RIC platform and sample xApps.",
        ],
    )
}

/// In-memory HTTP fetcher; unknown URLs answer 404.
#[derive(Default)]
pub struct MapFetcher {
    pages: Mutex<HashMap<String, HttpResponse>>,
    calls: AtomicUsize,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, status: u16, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for MapFetcher {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(HttpResponse {
                status: 404,
                body: String::new(),
            }))
    }
}

pub fn source(name: &str, urls: &[&str]) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        urls: urls.iter().map(|u| u.to_string()).collect(),
        enabled: true,
        source_type: "nephio".to_string(),
        description: String::new(),
    }
}

/// Default configuration with the given sources, small chunks, and a
/// near-zero retry backoff.
pub fn test_config(sources: Vec<SourceConfig>) -> Config {
    let mut config = Config::parse("[store]\nbackend = \"memory\"\n").unwrap();
    config.sources = sources;
    config.chunking.chunk_size = 200;
    config.chunking.overlap = 40;
    config.loader.retry_backoff_ms = 1;
    config
}

pub fn system_with(
    config: Config,
    fetcher: Arc<MapFetcher>,
    adapter: Arc<dyn LlmAdapter>,
    store: Arc<dyn VectorStore>,
) -> RagSystem {
    RagSystem::from_parts(
        config,
        RagParts {
            fetcher,
            embedder: Arc::new(HashingProvider::new(256)),
            adapter,
            store,
        },
    )
}

pub fn system(config: Config, fetcher: Arc<MapFetcher>) -> RagSystem {
    system_with(
        config,
        fetcher,
        Arc::new(MockAdapter::new()),
        Arc::new(InMemoryStore::new()),
    )
}

/// Fetcher serving the Porch and RIC pages.
pub fn docs_fetcher() -> Arc<MapFetcher> {
    let fetcher = Arc::new(MapFetcher::new());
    fetcher.set(PORCH_URL, 200, porch_page());
    fetcher.set(RIC_URL, 200, ric_page());
    fetcher
}
