//! Document loader: fetch, clean, and validate documentation pages.
//!
//! Each URL of a [`SourceConfig`] is fetched independently. A URL that
//! keeps failing or yields too little text is reported as a
//! [`SourceFailure`] and the loader moves on to the next one.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other non-2xx → fail immediately
//! - transport errors and timeouts → retry
//! - backoff: `retry_backoff_ms × 2^(attempt-1)`, exponent capped at 5

use chrono::Utc;
use scraper::{ElementRef, Html, Node, Selector};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LoaderConfig, SourceConfig};
use crate::error::{RagError, Result};
use crate::fetch::HttpFetcher;
use crate::models::{Document, DocumentMetadata, SourceFailure};

/// Candidate roots for the main content, most specific first.
const CONTENT_ROOTS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    ".td-content",
    ".content",
    "body",
];

/// Elements whose text is navigation or chrome, never content.
const BOILERPLATE: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form", "svg", "button",
    "template", "iframe",
];

/// Elements that end a paragraph.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5",
    "h6", "pre", "table", "tr", "blockquote", "dl", "dt", "dd", "br", "hr", "figure",
];

/// Documents and per-URL failures produced for one source.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<SourceFailure>,
}

pub struct DocumentLoader {
    fetcher: Arc<dyn HttpFetcher>,
    config: LoaderConfig,
}

impl DocumentLoader {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, config: &LoaderConfig) -> Self {
        Self {
            fetcher,
            config: config.clone(),
        }
    }

    /// Load every URL of `source`, isolating failures per URL.
    pub async fn load(&self, source: &SourceConfig) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();

        for url in &source.urls {
            match self.load_url(source, url).await {
                Ok(doc) => {
                    info!(
                        source = %source.name,
                        url = %url,
                        bytes = doc.content.len(),
                        "document loaded"
                    );
                    outcome.documents.push(doc);
                }
                Err(e) => {
                    warn!(source = %source.name, url = %url, error = %e, "skipping url");
                    outcome.failures.push(SourceFailure {
                        source: source.name.clone(),
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    /// Fetch, clean, and quality-check a single URL.
    pub async fn load_url(&self, source: &SourceConfig, url: &str) -> Result<Document> {
        let body = self.fetch_with_retry(url).await?;
        let (title, content) = extract_content(&body);

        if content.len() < self.config.min_content_bytes {
            return Err(RagError::ContentQuality {
                url: url.to_string(),
                bytes: content.len(),
                min: self.config.min_content_bytes,
            });
        }

        Ok(Document {
            metadata: DocumentMetadata {
                source_url: url.to_string(),
                title: title.unwrap_or_else(|| url.to_string()),
                source_name: source.name.clone(),
                source_type: source.source_type.clone(),
                fetched_at: Utc::now(),
                content_hash: hash_content(&content),
            },
            content,
        })
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay =
                    Duration::from_millis(self.config.retry_backoff_ms << (attempt - 1).min(5));
                debug!(url, attempt, ?delay, "retrying fetch");
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(timeout, self.fetcher.get(url, timeout)).await
            {
                Ok(r) => r,
                Err(_) => Err(RagError::Timeout {
                    operation: format!("GET {}", url),
                    secs: timeout.as_secs_f64(),
                }),
            };

            match result {
                Ok(resp) if resp.is_success() => return Ok(resp.body),
                Ok(resp) if resp.is_retryable() => {
                    last_err = Some(format!("HTTP {}", resp.status));
                }
                Ok(resp) => {
                    return Err(RagError::Fetch {
                        url: url.to_string(),
                        reason: format!("HTTP {}", resp.status),
                    });
                }
                Err(e) if e.is_transient() => last_err = Some(e.to_string()),
                Err(e) => return Err(e),
            }
        }

        Err(RagError::Fetch {
            url: url.to_string(),
            reason: format!(
                "{} (after {} attempts)",
                last_err.unwrap_or_else(|| "no response".to_string()),
                self.config.max_retries + 1
            ),
        })
    }
}

/// SHA-256 of normalized content, hex encoded.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract `(title, normalized text)` from a response body.
///
/// HTML bodies have boilerplate removed and block elements turned into
/// paragraph breaks. Anything else is treated as plain text.
pub fn extract_content(body: &str) -> (Option<String>, String) {
    if !body.trim_start().starts_with('<') {
        return (None, normalize_whitespace(body));
    }

    let html = Html::parse_document(body);

    let title = selector("title")
        .and_then(|s| html.select(&s).next())
        .or_else(|| selector("h1").and_then(|s| html.select(&s).next()))
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let root = CONTENT_ROOTS
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|s| html.select(&s).next());

    let mut raw = String::new();
    match root {
        Some(el) => collect_text(el, &mut raw),
        None => collect_text(html.root_element(), &mut raw),
    }

    (title, normalize_whitespace(&raw))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Append the visible text under `element`, skipping boilerplate subtrees.
/// Inline whitespace collapses to single spaces; block boundaries emit `\n\n`.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let words: Vec<&str> = text.split_whitespace().collect();
                if words.is_empty() {
                    if !text.is_empty() {
                        out.push(' ');
                    }
                    continue;
                }
                if text.starts_with(char::is_whitespace) {
                    out.push(' ');
                }
                out.push_str(&words.join(" "));
                if text.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if BOILERPLATE.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    let is_block = BLOCKS.contains(&name);
                    if is_block {
                        out.push_str("\n\n");
                    }
                    collect_text(child_el, out);
                    if is_block {
                        out.push_str("\n\n");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace runs inside paragraphs and join paragraphs with a
/// single blank line.
pub fn normalize_whitespace(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(|block| block.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
