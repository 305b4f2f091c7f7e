//! Async HTTP client wrapping reqwest.
//!
//! Deliberately thin: no hidden retries or backoff. The pagination loop owns
//! the retry/halt policy, so a non-2xx status is returned as data, and only
//! transport problems surface as errors. Falls back to HTTP/1.1 for servers
//! that reject HTTP/2.

use anyhow::Result;
use std::time::Duration;

/// Response from a page request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text (read even on error statuses, for diagnostics).
    pub body: String,
}

/// HTTP client for the API acquisition strategy.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client.
    h1_client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout_ms: u64) -> Self {
        let ua = format!("StickerScout/{}", env!("CARGO_PKG_VERSION"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(&ua)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(&ua)
            .http1_only()
            .build()
            .unwrap_or_default();

        Self { client, h1_client }
    }

    /// Perform a single GET with the given headers.
    pub async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<FetchResponse> {
        match self.get_inner(&self.client, url, headers).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                let err_str = format!("{e}");
                if err_str.contains("http2")
                    || err_str.contains("protocol")
                    || err_str.contains("connection closed")
                {
                    self.get_inner(&self.h1_client, url, headers).await
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse> {
        let mut builder = client.get(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let r = builder.send().await?;
        let status = r.status().as_u16();
        let body = r.text().await.unwrap_or_default();

        Ok(FetchResponse { status, body })
    }
}
