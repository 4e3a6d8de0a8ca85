//! Origin client — the single forwarding call to the upstream server.
//!
//! The resolver depends on the [`Origin`] trait; [`HttpOrigin`] is the
//! production implementation that issues one GET per cache miss. There is
//! deliberately no retry logic here: a failed fetch is surfaced to the
//! caller and nothing is written to the store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors produced while fetching from the origin.
#[derive(Debug, Error)]
pub enum OriginError {
    /// Network-level failure: connection refused, timeout, or a body that
    /// is not valid JSON.
    #[error("origin request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The origin answered with a non-success status.
    #[error("origin returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
}

/// Contract the caching core requires of the upstream origin.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetches `path_and_query` from the origin and returns the parsed
    /// JSON body. One attempt, no retry.
    async fn fetch(&self, path_and_query: &str) -> Result<Value, OriginError>;
}

/// HTTP origin client backed by [`reqwest`].
///
/// The request timeout bounds how long a cache miss can stall; on timeout
/// the resolution fails and no partial value reaches the store.
pub struct HttpOrigin {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOrigin {
    /// Default per-request timeout.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the origin at `base_url` with the default timeout.
    ///
    /// A trailing slash on `base_url` is stripped so that joining with the
    /// request's `/path?query` never produces a double slash.
    ///
    /// # Errors
    ///
    /// Returns [`OriginError::Request`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, OriginError> {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OriginError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    /// Returns the configured origin base URL (without a trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, path_and_query: &str) -> Result<Value, OriginError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(%url, "forwarding to origin");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::Status {
                status: status.as_u16(),
                path: path_and_query.to_owned(),
            });
        }

        let body = response.json::<Value>().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_stripped_from_base_url() {
        let origin = HttpOrigin::new("http://localhost:3000/").unwrap();
        assert_eq!(origin.base_url(), "http://localhost:3000");
    }

    #[test]
    fn bare_base_url_unchanged() {
        let origin = HttpOrigin::new("https://api.example.com").unwrap();
        assert_eq!(origin.base_url(), "https://api.example.com");
    }
}
