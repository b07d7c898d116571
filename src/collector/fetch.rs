//! Transport seam for vendor pages.
//!
//! Collectors never talk to reqwest or the browser directly; they ask
//! a `PageFetcher` for a page and get back HTML plus the post-redirect
//! address. That keeps the retry state machine identical for plain
//! HTTP vendors and browser-automation vendors.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure taxonomy. `NotFound` is terminal per item;
/// the other variants are retryable.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("resource not found (404)")]
    NotFound,

    #[error("page error: {0}")]
    Parse(String),
}

/// A landed page after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final address, after any redirect the transport followed.
    pub url: String,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page. `consent_selector` names the vendor's cookie
    /// interstitial control; dismissal is best-effort and the absence
    /// of the control is never an error.
    async fn fetch(
        &self,
        url: &str,
        consent_selector: Option<&str>,
    ) -> std::result::Result<FetchedPage, FetchError>;
}

/// Plain-HTTP fetcher for vendors without an anti-bot posture.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        _consent_selector: Option<&str>,
    ) -> std::result::Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            // Non-404 failures (rate limiting, 5xx) are worth a retry.
            return Err(FetchError::Transport(format!("status {status}")));
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(FetchedPage { url: final_url, html })
    }
}
