//! LLM adapter capability.
//!
//! The answer synthesizer talks to a language model only through
//! [`LlmAdapter`]. Adapters never fail with an error: transport or model
//! failures come back as an [`LlmResponse`] with `success = false` and the
//! reason in `error`. Timeouts are enforced by the caller.
//!
//! | `[llm] provider` | Adapter |
//! |------------------|---------|
//! | `"mock"` | [`MockAdapter`], deterministic, offline |
//! | `"openai"` | [`OpenAiAdapter`], any OpenAI-compatible chat completions endpoint |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::LlmConfig;

/// Outcome of one adapter call.
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub success: bool,
    pub answer: String,
    pub error: Option<String>,
    /// Seconds spent in the call.
    pub query_time: f64,
}

impl LlmResponse {
    pub fn ok(answer: impl Into<String>, query_time: f64) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            error: None,
            query_time,
        }
    }

    pub fn failed(error: impl Into<String>, query_time: f64) -> Self {
        Self {
            success: false,
            answer: String::new(),
            error: Some(error.into()),
            query_time,
        }
    }
}

#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Short identifier shown in status output.
    fn name(&self) -> &str;

    async fn query(&self, prompt: &str) -> LlmResponse;
}

/// Offline adapter that answers from the first context passage of the
/// prompt. Used by default and in tests.
#[derive(Debug, Default)]
pub struct MockAdapter;

impl MockAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// First text line after the `[1] ...` context header, if any.
fn first_context_line(prompt: &str) -> Option<&str> {
    let mut lines = prompt.lines();
    lines.find(|l| l.starts_with("[1] "))?;
    lines.map(str::trim).find(|l| !l.is_empty())
}

#[async_trait]
impl LlmAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query(&self, prompt: &str) -> LlmResponse {
        let answer = match first_context_line(prompt) {
            Some(line) => {
                let excerpt: String = line.chars().take(300).collect();
                format!("According to the documentation: {}", excerpt)
            }
            None => "The provided documentation does not cover this question.".to_string(),
        };
        LlmResponse::ok(answer, 0.0)
    }
}

/// Adapter for OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiAdapter {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for the openai provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.base_url),
            model,
            api_key,
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            bail!("LLM API error {}: {}", status, text);
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            bail!("LLM returned an empty answer");
        }
        Ok(content)
    }
}

/// Resolve the chat completions endpoint from a base URL.
fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn query(&self, prompt: &str) -> LlmResponse {
        let started = Instant::now();
        match self.complete(prompt).await {
            Ok(answer) => LlmResponse::ok(answer, started.elapsed().as_secs_f64()),
            Err(e) => {
                debug!(error = %e, "LLM call failed");
                LlmResponse::failed(format!("{:#}", e), started.elapsed().as_secs_f64())
            }
        }
    }
}

/// Create the adapter named by `[llm] provider`.
pub fn create_adapter(config: &LlmConfig) -> Result<Arc<dyn LlmAdapter>> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockAdapter::new())),
        "openai" => Ok(Arc::new(OpenAiAdapter::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
