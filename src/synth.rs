//! Answer synthesis: prompt assembly, adapter dispatch, source attribution.
//!
//! The synthesizer never fails. Adapter errors and timeouts become a
//! [`QueryResult`] with `success = false` whose `answer` explains what
//! went wrong.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::LlmConfig;
use crate::error::RagError;
use crate::llm::LlmAdapter;
use crate::models::{QueryResult, ScoredChunk, SourceRef};

const PREAMBLE: &str = "You are an expert on O-RAN and Nephio. Answer the question using only \
the documentation context below. If the context does not contain the answer, say so. \
Cite the passages you use by their [n] number.";

/// Deadline used when the configured timeout is not a usable duration.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

pub const NO_CONTEXT_ANSWER: &str =
    "No relevant documentation was found for this question in the indexed sources.";

pub struct AnswerSynthesizer {
    adapter: Arc<dyn LlmAdapter>,
    timeout_secs: f64,
    max_context_chars: usize,
    preview_chars: usize,
}

/// Prompt text plus the number of context chunks that fit the budget.
pub struct Prompt {
    pub text: String,
    pub used: usize,
}

impl AnswerSynthesizer {
    pub fn new(adapter: Arc<dyn LlmAdapter>, config: &LlmConfig) -> Self {
        Self {
            adapter,
            timeout_secs: config.timeout_secs,
            max_context_chars: config.max_context_chars,
            preview_chars: config.preview_chars,
        }
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Assemble the prompt from chunks in relevance order.
    ///
    /// The question and the context blocks share `max_context_chars`; the
    /// question is cut to the budget first. A chunk is included whole or not
    /// at all, and assembly stops at the first chunk that would exceed what
    /// is left. The most relevant chunk is always included.
    pub fn build_prompt(&self, question: &str, context: &[ScoredChunk]) -> Prompt {
        let question: String = question.trim().chars().take(self.max_context_chars).collect();
        let mut text = String::from(PREAMBLE);
        text.push_str("\n\nContext:\n");

        let mut budget_used = question.chars().count();
        let mut used = 0usize;
        for (i, hit) in context.iter().enumerate() {
            let meta = &hit.chunk.metadata.document;
            let block = format!(
                "\n[{}] {} ({})\n{}\n",
                i + 1,
                meta.title,
                meta.source_url,
                hit.chunk.text.trim()
            );
            let block_chars = block.chars().count();
            if used > 0 && budget_used + block_chars > self.max_context_chars {
                break;
            }
            budget_used += block_chars;
            used += 1;
            text.push_str(&block);
        }

        text.push_str("\nQuestion: ");
        text.push_str(&question);
        text.push_str("\nAnswer:");
        Prompt { text, used }
    }

    /// One source per distinct URL, first-seen order.
    pub fn sources(&self, context: &[ScoredChunk]) -> Vec<SourceRef> {
        let mut seen = HashSet::new();
        context
            .iter()
            .filter(|hit| seen.insert(hit.chunk.source_url().to_string()))
            .map(|hit| SourceRef {
                url: hit.chunk.source_url().to_string(),
                title: hit.chunk.metadata.document.title.clone(),
                content_preview: hit.chunk.text.chars().take(self.preview_chars).collect(),
            })
            .collect()
    }

    /// Answer `question` from `context`. Never returns an error.
    pub async fn answer(&self, question: &str, context: &[ScoredChunk]) -> QueryResult {
        let started = Instant::now();
        if context.is_empty() {
            return QueryResult {
                question: question.to_string(),
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                query_time: started.elapsed().as_secs_f64(),
                success: true,
            };
        }

        let prompt = self.build_prompt(question, context);
        let sources = self.sources(&context[..prompt.used]);
        let deadline = Duration::try_from_secs_f64(self.timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(FALLBACK_TIMEOUT);

        let (answer, success) =
            match tokio::time::timeout(deadline, self.adapter.query(&prompt.text)).await {
                Ok(resp) if resp.success && !resp.answer.trim().is_empty() => (resp.answer, true),
                Ok(resp) => {
                    let reason = resp
                        .error
                        .unwrap_or_else(|| "the language model returned an empty answer".to_string());
                    let err = RagError::Adapter(reason);
                    warn!(adapter = self.adapter.name(), error = %err, "LLM adapter failed");
                    (format!("Unable to generate an answer: {}", err), false)
                }
                Err(_) => {
                    warn!(
                        adapter = self.adapter.name(),
                        timeout_secs = deadline.as_secs_f64(),
                        "LLM adapter timed out"
                    );
                    (
                        format!(
                            "The language model did not respond within {:.1}s (timeout). Please try again later.",
                            deadline.as_secs_f64()
                        ),
                        false,
                    )
                }
            };

        QueryResult {
            question: question.to_string(),
            answer,
            sources,
            query_time: started.elapsed().as_secs_f64(),
            success,
        }
    }
}
