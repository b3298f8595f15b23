use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

use crate::error::{Result, ScienceError};
use crate::types::SourceName;

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 10;

/// User-Agent sent to every upstream. With a contact address CrossRef and
/// OpenAlex route requests to their polite pools.
pub fn user_agent(polite_email: Option<&str>) -> String {
    let base = format!("paperlog/{}", env!("CARGO_PKG_VERSION"));
    match polite_email.map(str::trim).filter(|email| !email.is_empty()) {
        Some(email) => format!("{base} (mailto:{email})"),
        None => base,
    }
}

// ─── HttpClient ───────────────────────────────────────────────────────────────

/// Thin reqwest wrapper owned by one source adapter. Performs no pacing and no
/// retries; spacing between batches belongs to the
/// [`RateLimiter`](crate::rate_limit::RateLimiter), and a 429 is surfaced as
/// [`ScienceError::RateLimit`] so the caller can extend the global cooldown.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    source: SourceName,
}

impl HttpClient {
    pub fn new(source: SourceName, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, source })
    }

    pub fn source(&self) -> SourceName {
        self.source
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        tracing::debug!(source = %self.source, url, "GET");
        let resp = self.client.get(url).headers(headers).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ScienceError::RateLimit(self.source.to_string(), wait));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ScienceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(ScienceError::ApiError(
                self.source.to_string(),
                format!("HTTP {}: {body}", status.as_u16()),
            ));
        }

        Ok(resp.text().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text)
            .map_err(|e| ScienceError::Parse(format!("{}: {e}", self.source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(SourceName::CrossRef, &user_agent(None), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn user_agent_carries_contact_address() {
        assert!(user_agent(None).starts_with("paperlog/"));
        assert!(user_agent(Some("  ")).ends_with(env!("CARGO_PKG_VERSION")));
        assert!(user_agent(Some("me@example.org")).ends_with("(mailto:me@example.org)"));
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let err = client()
            .get(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::RateLimit(ref s, 7) if s == "crossref"));
    }

    #[tokio::test]
    async fn server_error_and_bad_json_are_errors() {
        let mut server = mockito::Server::new_async().await;
        let _boom = server
            .mock("GET", "/boom")
            .with_status(503)
            .with_body("down")
            .create_async()
            .await;
        let _junk = server
            .mock("GET", "/junk")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let c = client();
        let err = c.get(&format!("{}/boom", server.url())).await.unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(..)));

        let err = c
            .get_json::<serde_json::Value>(&format!("{}/junk", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_resource_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/gone").with_status(404).create_async().await;

        let err = client()
            .get(&format!("{}/gone", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::NotFound(_)));
    }
}
