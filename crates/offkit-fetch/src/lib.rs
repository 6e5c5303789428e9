//! # Offkit Fetch
//!
//! Request classification and cache strategies for the Offkit offline
//! caching layer.
//!
//! ## Design Goals
//!
//! 1. **One strategy per request**: pure classification, exactly one handler
//! 2. **Offline resilience**: navigations and API calls always resolve
//! 3. **Non-blocking writes**: cache updates never delay the response path
//!
//! ## Architecture
//!
//! ```text
//! Request ──→ classify ──→ Navigation  (network-first, offline page)
//!                      ├─→ Api         (network-first, cache fallback, 503)
//!                      └─→ StaticAsset (cache-first, network write-back)
//!                               │
//!                               └── SharedCacheStore (current generation)
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use offkit_cache::{CacheKey, StoredResponse};

pub mod router;
pub mod strategy;

pub use router::{classify, RequestClass, RouterConfig};
pub use strategy::{StrategyRouter, OFFLINE_MESSAGE, SERVED_BY_HEADER, SERVED_BY_VALUE};

// ==================== Errors ====================

/// Errors for rejected fetches.
///
/// A `FetchError` models the transport failing outright (no connectivity,
/// timeout, bad URL) — an HTTP error status is a *response*, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::RequestFailed(err.to_string())
        }
    }
}

// ==================== Request ====================

/// Request mode, used by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// A top-level document navigation.
    Navigate,
    /// Everything else (API calls, subresources).
    #[default]
    Standard,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::Standard,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Some(body),
            mode: RequestMode::Standard,
        }
    }

    /// Create a navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The request's cache identity (method + URL, headers ignored).
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

// ==================== Response ====================

/// A response returned to the page: live, cached, or synthesized.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Body of the synthesized offline API response.
#[derive(Debug, Serialize)]
struct OfflineBody<'a> {
    error: &'a str,
    message: &'a str,
    offline: bool,
}

impl Response {
    /// Create a response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        }
    }

    /// Check if the response is a success (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Add a header, returning the modified response.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, FetchError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| FetchError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::RequestFailed(e.to_string()))
    }

    /// Synthesized 503 JSON for API requests that cannot be served.
    pub fn offline_json(message: &str) -> Self {
        let body = OfflineBody {
            error: "Offline",
            message,
            offline: true,
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self::new(StatusCode::SERVICE_UNAVAILABLE, headers, Bytes::from(bytes))
    }

    /// Minimal synthesized offline page, served only when the designated
    /// fallback document was never cached.
    pub fn offline_page() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            Bytes::from_static(b"<!doctype html><html><body><h1>You are offline</h1></body></html>"),
        )
    }

    /// Snapshot this response for the cache store.
    pub fn to_stored(&self) -> StoredResponse {
        let mut headers = HashMap::new();
        for (name, value) in self.headers.iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        StoredResponse::new(
            self.status.as_u16(),
            self.status_text.clone(),
            headers,
            self.body.to_vec(),
        )
    }

    /// Rebuild a response from a cache snapshot, preserving status,
    /// status text, headers, and body.
    pub fn from_stored(stored: StoredResponse) -> Self {
        let status =
            StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        Self {
            status,
            status_text: stored.status_text,
            headers,
            body: Bytes::from(stored.body),
        }
    }
}

// ==================== Fetcher ====================

/// The live-fetch seam. Strategies and the sync queue go through this
/// trait; production wires in [`HttpFetcher`], tests wire in mocks.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute a request against the network.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "Offkit/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Production fetcher backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(FetcherConfig::default())
    }

    /// Create a fetcher with custom configuration.
    pub fn with_config(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        debug!(method = %request.method, url = %request.url, "Live fetch");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        trace!(url = %request.url, status = %status, body_len = body.len(), "Live response");

        Ok(Response::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_builders() {
        let u = url("https://portal.example.gov/api/applications");
        let get = Request::get(u.clone());
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.mode, RequestMode::Standard);

        let nav = Request::navigate(url("https://portal.example.gov/"));
        assert_eq!(nav.mode, RequestMode::Navigate);
        assert_eq!(nav.method, Method::GET);

        let post = Request::post(u, Bytes::from_static(b"{}"));
        assert_eq!(post.method, Method::POST);
        assert!(post.body.is_some());
    }

    #[test]
    fn test_request_cache_key_ignores_headers() {
        let u = url("https://portal.example.gov/api/documents");
        let plain = Request::get(u.clone());
        let decorated = Request::get(u).header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("abc123"),
        );
        assert_eq!(plain.cache_key(), decorated.cache_key());
    }

    #[test]
    fn test_offline_json_shape() {
        let response = Response::offline_json("try again later");
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header("content-type"), Some("application/json"));

        let body: Value = response.json().unwrap();
        assert_eq!(body["error"], "Offline");
        assert_eq!(body["message"], "try again later");
        assert_eq!(body["offline"], true);
    }

    #[test]
    fn test_stored_roundtrip_preserves_status_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let response = Response::new(
            StatusCode::CREATED,
            headers,
            Bytes::from_static(b"{\"id\":7}"),
        );

        let rebuilt = Response::from_stored(response.to_stored());
        assert_eq!(rebuilt.status, StatusCode::CREATED);
        assert_eq!(rebuilt.status_text, "Created");
        assert_eq!(rebuilt.header("content-type"), Some("application/json"));
        assert_eq!(rebuilt.body, response.body);
    }

    #[tokio::test]
    async fn test_http_fetcher_against_mock_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"up\":true}"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let request = Request::get(url(&format!("{}/api/status", server.uri())));
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"{\"up\":true}"));
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_on_connect_failure() {
        let fetcher = HttpFetcher::new().unwrap();
        // Reserved port with nothing listening.
        let request = Request::get(url("http://127.0.0.1:9/api/status"));
        let result = fetcher.fetch(&request).await;
        assert!(result.is_err());
    }
}
