//! # Offkit Cache
//!
//! Generation-tagged request/response cache store for the Offkit offline
//! caching layer.
//!
//! ## Architecture
//!
//! ```text
//! CacheStore
//!     ├── Generation "portal-cache-v2"   (stale, deleted on activate)
//!     └── Generation "portal-cache-v3"   (current)
//!             └── CacheKey (method + URL) → StoredResponse
//! ```
//!
//! Exactly one generation is current at any time; the rest are stale and
//! garbage-collected when the next worker activates. Entries are written
//! only from successful responses and follow last-write-wins per key.

use hashbrown::HashMap;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use offkit_common::Clock;

// ==================== Errors ====================

/// Cache store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Writes are restricted to successful responses.
    #[error("Response with status {0} is not storable")]
    NotStorable(u16),

    #[error("Unknown generation: {0}")]
    UnknownGeneration(String),
}

// ==================== Cache Key ====================

/// Normalized request identity: method + full URL.
///
/// Classifying headers play no part in the key; two requests to the same
/// URL with the same method share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    method: String,
    url: String,
}

impl CacheKey {
    /// Create a key from a method and URL.
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Create a GET key for a URL (pre-warm and fallback lookups).
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    /// The request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Stored Response ====================

/// A stored response snapshot: status, headers, body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Response status code.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch), stamped on write.
    pub stored_at_ms: u64,
}

impl StoredResponse {
    /// Create a snapshot; `stored_at_ms` is stamped by the store on write.
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body,
            stored_at_ms: 0,
        }
    }

    /// Whether the snapshot's status is a success (2xx).
    pub fn is_success(&self) -> bool {
        StatusCode::from_u16(self.status)
            .map(|s| s.is_success())
            .unwrap_or(false)
    }
}

// ==================== Generation ====================

/// One named cache generation.
#[derive(Debug, Default, Clone)]
pub struct Generation {
    /// Generation name (version-stamped).
    name: String,

    /// Cached entries, last-write-wins per key.
    entries: HashMap<CacheKey, StoredResponse>,
}

impl Generation {
    /// Create an empty generation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Generation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an entry.
    pub fn lookup(&self, key: &CacheKey) -> Option<&StoredResponse> {
        self.entries.get(key)
    }

    /// Store an entry. Only successful responses are storable; a newer
    /// write for the same key overwrites the previous entry.
    pub fn put(&mut self, key: CacheKey, response: StoredResponse) -> Result<(), CacheError> {
        if !response.is_success() {
            return Err(CacheError::NotStorable(response.status));
        }
        trace!(generation = %self.name, key = %key, "Cache write");
        self.entries.insert(key, response);
        Ok(())
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All entry keys.
    pub fn keys(&self) -> Vec<&CacheKey> {
        self.entries.keys().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the generation holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Store ====================

/// The set of cache generations.
#[derive(Debug, Default)]
pub struct CacheStore {
    generations: HashMap<String, Generation>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a generation, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Generation {
        self.generations
            .entry(name.to_string())
            .or_insert_with(|| Generation::new(name))
    }

    /// Whether a generation exists.
    pub fn has(&self, name: &str) -> bool {
        self.generations.contains_key(name)
    }

    /// Delete a generation and all its entries.
    pub fn delete(&mut self, name: &str) -> bool {
        self.generations.remove(name).is_some()
    }

    /// All generation names.
    pub fn names(&self) -> Vec<&str> {
        self.generations.keys().map(|s| s.as_str()).collect()
    }

    /// Look up an entry in a specific generation. A missing generation is
    /// a miss, not an error.
    pub fn lookup_in(&self, generation: &str, key: &CacheKey) -> Option<&StoredResponse> {
        self.generations.get(generation)?.lookup(key)
    }

    /// Look up an entry across all generations.
    pub fn lookup(&self, key: &CacheKey) -> Option<&StoredResponse> {
        self.generations.values().find_map(|g| g.lookup(key))
    }
}

// ==================== Shared Store ====================

/// Shared async handle to the cache store.
///
/// Safe for concurrent read/write: last-write-wins per key, no
/// transactional guarantee across keys. Stamps `stored_at_ms` from the
/// injected clock on every write.
#[derive(Clone)]
pub struct SharedCacheStore {
    inner: Arc<RwLock<CacheStore>>,
    clock: Arc<dyn Clock>,
}

impl SharedCacheStore {
    /// Create an empty shared store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheStore::new())),
            clock,
        }
    }

    /// Open (create if absent) a generation.
    pub async fn open(&self, generation: &str) {
        self.inner.write().await.open(generation);
    }

    /// Store an entry in a generation, stamping the write time.
    pub async fn put(
        &self,
        generation: &str,
        key: CacheKey,
        mut response: StoredResponse,
    ) -> Result<(), CacheError> {
        response.stored_at_ms = self.clock.now_ms();
        self.inner.write().await.open(generation).put(key, response)
    }

    /// Look up an entry in a generation.
    pub async fn lookup(&self, generation: &str, key: &CacheKey) -> Option<StoredResponse> {
        self.inner.read().await.lookup_in(generation, key).cloned()
    }

    /// Whether an entry exists in a generation.
    pub async fn contains(&self, generation: &str, key: &CacheKey) -> bool {
        self.inner.read().await.lookup_in(generation, key).is_some()
    }

    /// All generation names.
    pub async fn generation_names(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Delete every generation except `current`; returns the deleted names.
    pub async fn delete_generations_except(&self, current: &str) -> Vec<String> {
        let mut store = self.inner.write().await;
        let stale: Vec<String> = store
            .names()
            .into_iter()
            .filter(|name| *name != current)
            .map(|s| s.to_string())
            .collect();

        for name in &stale {
            store.delete(name);
            debug!(generation = %name, "Deleted stale cache generation");
        }
        stale
    }

    /// Number of entries in a generation (0 if absent).
    pub async fn generation_len(&self, generation: &str) -> usize {
        self.inner
            .read()
            .await
            .generations
            .get(generation)
            .map(|g| g.len())
            .unwrap_or(0)
    }
}
