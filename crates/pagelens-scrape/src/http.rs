use std::time::Duration;

use async_trait::async_trait;
use pagelens_types::{FetchReason, PagelensError, Result};

use crate::{clean_html, PageFetcher};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain HTTP GET followed by [`clean_html`].
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only absolute http/https URLs are fetched.
    pub fn parse_url(raw: &str) -> Result<url::Url> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| PagelensError::fetch(raw, FetchReason::InvalidUrl, e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PagelensError::fetch(
                raw,
                FetchReason::InvalidUrl,
                format!("only http/https URLs are allowed, got: {}", parsed.scheme()),
            ));
        }
        Ok(parsed)
    }

    async fn fetch_html(&self, url: &url::Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PagelensError::fetch(url.as_str(), FetchReason::Network, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PagelensError::fetch(
                url.as_str(),
                FetchReason::HttpStatus,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        resp.text()
            .await
            .map_err(|e| PagelensError::fetch(url.as_str(), FetchReason::Parse, e.to_string()))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Self::parse_url(url)?;
        let started = std::time::Instant::now();
        let html = self.fetch_html(&parsed).await?;
        let text = clean_html(&html);

        tracing::info!(
            url,
            html_bytes = html.len(),
            text_bytes = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched page"
        );

        if text.is_empty() {
            return Err(PagelensError::fetch(
                url,
                FetchReason::EmptyContent,
                "page produced no readable text",
            ));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: PagelensError) -> FetchReason {
        match err {
            PagelensError::Fetch { reason, .. } => reason,
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[test]
    fn parse_url_accepts_http_and_https() {
        assert!(HttpFetcher::parse_url("https://example.com").is_ok());
        assert!(HttpFetcher::parse_url("http://example.com/path?q=1").is_ok());
    }

    #[test]
    fn parse_url_rejects_other_schemes_and_garbage() {
        let err = HttpFetcher::parse_url("ftp://example.com").unwrap_err();
        assert_eq!(reason(err), FetchReason::InvalidUrl);
        let err = HttpFetcher::parse_url("not a url").unwrap_err();
        assert_eq!(reason(err), FetchReason::InvalidUrl);
    }

    #[tokio::test]
    async fn fetch_invalid_url_fails_before_network() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert_eq!(reason(err), FetchReason::InvalidUrl);
    }

    #[test]
    fn builder_overrides_defaults() {
        let fetcher = HttpFetcher::new()
            .with_user_agent("pagelens-test")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(fetcher.user_agent, "pagelens-test");
        assert_eq!(fetcher.timeout, Duration::from_secs(5));
        assert_eq!(fetcher.name(), "http");
    }
}
