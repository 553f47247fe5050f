//! HTTP fetch capability.
//!
//! The loader only depends on [`HttpFetcher`]; [`ReqwestFetcher`] is the
//! production implementation. Tests substitute canned responses.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{RagError, Result};

/// Status code and body of one HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 and 5xx are worth retrying; other 4xx are not.
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url`, failing with [`RagError::Timeout`] when `timeout` elapses
    /// and [`RagError::Fetch`] on transport errors. Non-2xx statuses are
    /// returned as responses, not errors.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// [`HttpFetcher`] backed by a shared `reqwest::Client`.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| classify(url, timeout, e))?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Timeout {
            operation: format!("GET {}", url),
            secs: timeout.as_secs_f64(),
        }
    } else {
        RagError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let r = |status| HttpResponse {
            status,
            body: String::new(),
        };
        assert!(r(200).is_success());
        assert!(!r(404).is_success());
        assert!(r(429).is_retryable());
        assert!(r(500).is_retryable());
        assert!(r(503).is_retryable());
        assert!(!r(404).is_retryable());
        assert!(!r(403).is_retryable());
    }
}
