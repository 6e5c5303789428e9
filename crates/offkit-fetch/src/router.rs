//! Request classification.
//!
//! Every intercepted request falls into exactly one class; classification
//! is pure and stateless. First match wins: navigation mode, then the API
//! path prefix, then static assets.

use url::Url;

use crate::{Request, RequestMode};

/// Handling class for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Top-level document navigation.
    Navigation,
    /// JSON traffic under the API prefix.
    Api,
    /// Everything else: scripts, styles, images, fonts.
    StaticAsset,
}

/// Router configuration: the fixed external knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Path prefix under which every request is treated as API traffic.
    pub api_prefix: String,
    /// The designated offline fallback document, served for failed
    /// navigations.
    pub offline_fallback: Url,
}

impl RouterConfig {
    /// Create a router configuration.
    pub fn new(api_prefix: impl Into<String>, offline_fallback: Url) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            offline_fallback,
        }
    }
}

/// Classify a request. Exactly one class per request, first match wins.
pub fn classify(request: &Request, config: &RouterConfig) -> RequestClass {
    if request.mode == RequestMode::Navigate {
        return RequestClass::Navigation;
    }
    if request.url.path().starts_with(&config.api_prefix) {
        return RequestClass::Api;
    }
    RequestClass::StaticAsset
}
