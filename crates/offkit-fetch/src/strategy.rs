//! Fetch strategies.
//!
//! Three policies, one per request class:
//!
//! - **Navigation**: network-first; a failed fetch silently becomes the
//!   cached offline fallback document — a full page is always returned.
//! - **Api**: network-first; a failed fetch falls back to the cached entry
//!   (marked with [`SERVED_BY_HEADER`]) or a synthesized 503 JSON body.
//!   Never rejects.
//! - **StaticAsset**: cache-first; a miss is fetched live and written back.
//!   A failed fetch for an uncached asset propagates.
//!
//! Cache writes are detached tasks: the response path never waits on them
//! and a write failure is logged, not surfaced.

use http::{HeaderName, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

use offkit_cache::{CacheKey, SharedCacheStore, StoredResponse};
use offkit_common::{spawn_detached, OffkitError};

use crate::router::{classify, RequestClass, RouterConfig};
use crate::{FetchError, Fetcher, Request, Response};

/// Header added to cache-fallback API responses, and only to those.
pub const SERVED_BY_HEADER: &str = "x-served-by";

/// Value of [`SERVED_BY_HEADER`].
pub const SERVED_BY_VALUE: &str = "service-worker-cache";

/// Message carried by the synthesized offline API response.
pub const OFFLINE_MESSAGE: &str =
    "No network connection and no cached copy of this request is available.";

/// Classifies each incoming request and runs the matching strategy against
/// the current cache generation.
pub struct StrategyRouter {
    fetcher: Arc<dyn Fetcher>,
    store: SharedCacheStore,
    config: RouterConfig,
    generation: String,
}

impl StrategyRouter {
    /// Create a router bound to one cache generation.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: SharedCacheStore,
        config: RouterConfig,
        generation: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            generation: generation.into(),
        }
    }

    /// The generation this router reads from and writes to.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Handle a request with exactly one strategy.
    ///
    /// Navigation and API requests always resolve to a response; only the
    /// static-asset path can reject, and only for uncached assets.
    pub async fn handle(&self, request: &Request) -> Result<Response, FetchError> {
        match classify(request, &self.config) {
            RequestClass::Navigation => Ok(self.navigation(request).await),
            RequestClass::Api => Ok(self.api(request).await),
            RequestClass::StaticAsset => self.static_asset(request).await,
        }
    }

    /// Network-first with offline fallback page.
    async fn navigation(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.write_through(request.cache_key(), response.to_stored());
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation fetch failed, serving offline page");
                let fallback_key = CacheKey::get(&self.config.offline_fallback);
                match self.store.lookup(&self.generation, &fallback_key).await {
                    Some(stored) => Response::from_stored(stored),
                    None => {
                        warn!(
                            fallback = %self.config.offline_fallback,
                            "Offline fallback not cached, synthesizing a page"
                        );
                        Response::offline_page()
                    }
                }
            }
        }
    }

    /// Network-first with cache fallback and a synthesized 503 last resort.
    async fn api(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                // Mutating requests must never be replayed from cache.
                if response.status == StatusCode::OK && request.method == Method::GET {
                    self.write_through(request.cache_key(), response.to_stored());
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "API fetch failed, consulting cache");
                match self.store.lookup(&self.generation, &request.cache_key()).await {
                    Some(stored) => Response::from_stored(stored).with_header(
                        HeaderName::from_static(SERVED_BY_HEADER),
                        HeaderValue::from_static(SERVED_BY_VALUE),
                    ),
                    None => Response::offline_json(OFFLINE_MESSAGE),
                }
            }
        }
    }

    /// Cache-first with network fallback and write-back.
    ///
    /// A cache hit is returned with no freshness check; deployments
    /// invalidate by bumping the generation name.
    async fn static_asset(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();

        if let Some(stored) = self.store.lookup(&self.generation, &key).await {
            return Ok(Response::from_stored(stored));
        }

        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            self.write_through(key, response.to_stored());
        }
        Ok(response)
    }

    /// Fire-and-forget cache write.
    fn write_through(&self, key: CacheKey, stored: StoredResponse) {
        let store = self.store.clone();
        let generation = self.generation.clone();
        spawn_detached("cache-write", async move {
            store
                .put(&generation, key, stored)
                .await
                .map_err(|e| OffkitError::cache_with_source("write-through failed", e))
        });
    }
}
