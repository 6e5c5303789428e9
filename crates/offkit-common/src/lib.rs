//! # Offkit Common
//!
//! Common utilities, error types, and logging configuration for the Offkit
//! offline caching layer.
//!
//! ## Features
//!
//! - Unified error type with category and retryability helpers
//! - Logging configuration and setup
//! - Retry with exponential backoff
//! - Detached background tasks (fire-and-forget with failure logging)
//! - Injectable clock for timestamping

use std::time::Duration;
use thiserror::Error;

pub mod clock;
pub mod logging;
pub mod retry;
pub mod task;

pub use clock::{Clock, FixedClock, SystemClock};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use task::{spawn_detached, DetachedTask};

/// Unified error type for Offkit.
#[derive(Error, Debug)]
pub enum OffkitError {
    /// Cache storage errors.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network fetch errors.
    #[error("Fetch error: {message}")]
    Fetch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker lifecycle errors.
    #[error("Lifecycle error: {message}")]
    Lifecycle {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Background sync errors.
    #[error("Sync error: {message}")]
    Sync {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl OffkitError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a cache error with source.
    pub fn cache_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fetch error with source.
    pub fn fetch_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Fetch {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a lifecycle error.
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: None,
        }
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OffkitError::Fetch { .. } | OffkitError::Timeout(_) | OffkitError::Io(_)
        )
    }

    /// Get the error category for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            OffkitError::Cache { .. } => "cache",
            OffkitError::Fetch { .. } => "fetch",
            OffkitError::Lifecycle { .. } => "lifecycle",
            OffkitError::Sync { .. } => "sync",
            OffkitError::Config { .. } => "config",
            OffkitError::Io(_) => "io",
            OffkitError::Timeout(_) => "timeout",
            OffkitError::NotFound(_) => "not_found",
            OffkitError::InvalidArgument(_) => "invalid_argument",
            OffkitError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for Offkit operations.
pub type Result<T> = std::result::Result<T, OffkitError>;
