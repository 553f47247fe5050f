//! TOML configuration parsing and validation.
//!
//! The configuration is read once at process start and passed by reference
//! into every component constructor. Validation failures are fatal: a bad
//! chunk size, an out-of-range retrieval parameter, or an empty source list
//! stops the process before any build is attempted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sources::official_sources;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "official_sources")]
    pub sources: Vec<SourceConfig>,
}

/// One logical documentation source. May expand to several URLs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}
fn default_source_type() -> String {
    "nephio".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/nrag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be `< chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// MMR trade-off: `1.0` is pure relevance, `0.0` pure diversity.
    #[serde(default = "default_diversity_lambda")]
    pub diversity_lambda: f64,
    #[serde(default)]
    pub score_threshold: Option<f64>,
    #[serde(default = "default_max_chunks_per_source")]
    pub max_chunks_per_source: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_k: default_fetch_k(),
            diversity_lambda: default_diversity_lambda(),
            score_threshold: None,
            max_chunks_per_source: default_max_chunks_per_source(),
        }
    }
}

fn default_k() -> usize {
    6
}
fn default_fetch_k() -> usize {
    20
}
fn default_diversity_lambda() -> f64 {
    0.7
}
fn default_max_chunks_per_source() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_loader_retries")]
    pub max_retries: u32,
    /// Base delay of the exponential backoff between fetch attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_min_content_bytes")]
    pub min_content_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_loader_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_content_bytes: default_min_content_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_loader_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_min_content_bytes() -> usize {
    200
}
fn default_user_agent() -> String {
    format!("oran-nephio-rag/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token, if any.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            max_context_chars: default_max_context_chars(),
            preview_chars: default_preview_chars(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_provider() -> String {
    "mock".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> f64 {
    120.0
}
fn default_max_context_chars() -> usize {
    8000
}
fn default_preview_chars() -> usize {
    200
}
fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum queries in flight against the LLM adapter at once.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

fn default_max_concurrent_queries() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Parse and validate a TOML configuration string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Sources with `enabled = true`, in configuration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }

        // Validate retrieval
        let r = &self.retrieval;
        if r.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if r.fetch_k < r.k {
            bail!("retrieval.fetch_k ({}) must be >= retrieval.k ({})", r.fetch_k, r.k);
        }
        if !(0.0..=1.0).contains(&r.diversity_lambda) {
            bail!("retrieval.diversity_lambda must be in [0.0, 1.0]");
        }
        if let Some(t) = r.score_threshold {
            if !(0.0..=1.0).contains(&t) {
                bail!("retrieval.score_threshold must be in [0.0, 1.0]");
            }
        }
        if r.max_chunks_per_source < 1 {
            bail!("retrieval.max_chunks_per_source must be >= 1");
        }

        if self.concurrency.max_concurrent_queries < 1 {
            bail!("concurrency.max_concurrent_queries must be >= 1");
        }
        if !self.llm.timeout_secs.is_finite() || self.llm.timeout_secs <= 0.0 {
            bail!("llm.timeout_secs must be a finite number > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => bail!(
                "Unknown store backend: '{}'. Must be sqlite or memory.",
                other
            ),
        }

        match self.embedding.provider.as_str() {
            "hashing" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or local.",
                other
            ),
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama") {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.llm.provider.as_str() {
            "mock" | "openai" => {}
            other => bail!("Unknown llm provider: '{}'. Must be mock or openai.", other),
        }

        // Validate sources
        if self.enabled_sources().next().is_none() {
            bail!("at least one enabled [[sources]] entry is required");
        }
        for source in self.enabled_sources() {
            if source.urls.is_empty() {
                bail!("source '{}' is enabled but has no urls", source.name);
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults_and_official_sources() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.k, 6);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.llm.provider, "mock");
        assert!(config.enabled_sources().count() > 0);
    }

    #[test]
    fn test_sources_parsed() {
        let config = Config::parse(
            r#"
[[sources]]
name = "nephio-docs"
urls = ["https://docs.nephio.org/docs/"]

[[sources]]
name = "disabled-one"
urls = ["https://example.org/"]
enabled = false
source_type = "oran_sc"
"#,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].source_type, "nephio");
        let enabled: Vec<_> = config.enabled_sources().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["nephio-docs"]);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = Config::parse("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_fetch_k_must_cover_k() {
        let err = Config::parse("[retrieval]\nk = 10\nfetch_k = 5\n").unwrap_err();
        assert!(err.to_string().contains("fetch_k"));
    }

    #[test]
    fn test_no_enabled_sources_is_fatal() {
        let err = Config::parse(
            "[[sources]]\nname = \"a\"\nurls = [\"https://a\"]\nenabled = false\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("enabled"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(Config::parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(Config::parse("[llm]\nprovider = \"selenium\"\n").is_err());
        assert!(Config::parse("[store]\nbackend = \"qdrant\"\n").is_err());
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        assert!(Config::parse("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(Config::parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../config/nrag.example.toml")).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].source_type, "oran_sc");
        assert_eq!(config.retrieval.fetch_k, 20);
        assert!(config.retrieval.score_threshold.is_none());
    }

    #[test]
    fn test_llm_timeout_must_be_finite_and_positive() {
        for value in ["nan", "inf", "-inf", "0.0", "-3.0"] {
            let toml = format!("[llm]\ntimeout_secs = {}\n", value);
            let err = Config::parse(&toml).unwrap_err();
            assert!(
                format!("{:#}", err).contains("llm.timeout_secs"),
                "{} should be rejected",
                value
            );
        }
        assert!(Config::parse("[llm]\ntimeout_secs = 0.5\n").is_ok());
    }
}
