//! # Offkit Service Worker
//!
//! Worker lifecycle for the Offkit offline caching layer.
//!
//! ## Features
//!
//! - **Lifecycle**: install (pre-warm), activate (generation GC + claim)
//! - **Fetch dispatch**: hands requests to the strategy router
//! - **Control messages**: skip-waiting, version query with reply channel
//! - **Background sync**: drain the pending-failed-request queue
//! - **Push**: fixed-template notifications with view/close actions
//!
//! ## Lifecycle
//!
//! ```text
//! new ──install──→ installing ──→ installed ──activate──→ activating ──→ activated
//!                      │              │                                      │
//!                      └─ pre-warm    └─ waiting hold skipped                └─ fetch handling
//! ```
//!
//! `run()` makes the ordering explicit: install fully settles before
//! activate begins, and activate settles before any fetch is handled. A
//! completed install is promoted immediately — the waiting hold is skipped
//! so the newest logic takes effect without every tab closing first.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use offkit_cache::{CacheError, SharedCacheStore};
use offkit_common::{retry_with_backoff, Clock, RetryPolicy};
use offkit_fetch::{FetchError, Fetcher, Request, Response, RouterConfig, StrategyRouter};

pub mod clients;
pub mod push;
pub mod sync;

pub use clients::{Client, Clients};
pub use push::{Notification, NotificationAction, PushPayload, DEFAULT_BODY, DEFAULT_TITLE};
pub use sync::{PendingRequest, SyncPolicy, SyncQueue, SyncReport};

// ==================== Errors ====================

/// Worker lifecycle errors.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed for {path}: {reason}")]
    InstallFailed { path: String, reason: String },

    #[error("Worker is not active")]
    NotActive,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

// ==================== State ====================

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Created, not yet installing.
    New,
    /// Install in progress (pre-warm running).
    Installing,
    /// Installed; the waiting hold is skipped on `run()`.
    Installed,
    /// Activate in progress (generation GC, client claiming).
    Activating,
    /// Active and handling fetches.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::New
    }
}

// ==================== Config ====================

/// Worker configuration, injected at start-up.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Cache generation name. The sole compatibility knob: bumped on every
    /// deployable change; equal names share cache contents, a different
    /// name triggers full replacement on the next activate.
    pub generation: String,

    /// Origin all relative paths resolve against.
    pub origin: Url,

    /// Paths guaranteed cached immediately after install.
    pub precache_manifest: Vec<String>,

    /// The offline fallback document, served for failed navigations.
    pub offline_fallback: String,

    /// Path prefix for API traffic.
    pub api_prefix: String,

    /// Route opened by the notification view action.
    pub notification_route: String,

    /// Sync tag that triggers a queue drain.
    pub sync_tag: String,

    /// Retry policy for pre-warm fetches during install.
    pub precache_retry: RetryPolicy,

    /// Retention policy for the background-sync queue.
    pub sync_policy: SyncPolicy,
}

impl WorkerConfig {
    /// Portal defaults against the given origin.
    pub fn portal(origin: Url) -> Self {
        Self {
            generation: "portal-cache-v3".to_string(),
            origin,
            precache_manifest: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
            ],
            offline_fallback: "/offline.html".to_string(),
            api_prefix: "/api/".to_string(),
            notification_route: "/dashboard".to_string(),
            sync_tag: "sync-pending-requests".to_string(),
            precache_retry: RetryPolicy::bounded(2),
            sync_policy: SyncPolicy::indefinite(),
        }
    }

    /// Override the generation name.
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    /// Resolve a path against the origin.
    fn resolve(&self, path: &str) -> Result<Url, WorkerError> {
        self.origin
            .join(path)
            .map_err(|e| WorkerError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Router configuration derived from this worker configuration.
    pub fn router_config(&self) -> Result<RouterConfig, WorkerError> {
        Ok(RouterConfig::new(
            self.api_prefix.clone(),
            self.resolve(&self.offline_fallback)?,
        ))
    }
}

// ==================== Messages & Events ====================

/// Control messages from pages to the worker.
///
/// The wire form is [`WireMessage`]; hosts attach the reply channel when
/// building the runtime message.
#[derive(Debug)]
pub enum ControlMessage {
    /// Promote a waiting (installed) worker immediately.
    SkipWaiting,
    /// Ask for the generation name over the supplied reply channel.
    GetVersion { reply: oneshot::Sender<VersionReply> },
}

/// JSON wire form of [`ControlMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    #[serde(rename = "GET_VERSION")]
    GetVersion,
}

/// Reply to a version query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Events emitted by the worker, consumed by the installability tracker
/// and the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Lifecycle state changed.
    StateChange { from: WorkerState, to: WorkerState },
    /// A new worker reached Installed while pages are still controlled by
    /// a previous generation.
    UpdateWaiting,
    /// A page came under this worker's control.
    ControllerChange { client_id: String },
}

// ==================== Service Worker ====================

/// The worker: lifecycle, fetch dispatch, sync, and push handling.
///
/// Dependencies (cache store, fetcher, clients, clock) are injected
/// explicitly; the worker holds no hidden globals.
pub struct ServiceWorker {
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    store: SharedCacheStore,
    fetcher: Arc<dyn Fetcher>,
    router: StrategyRouter,
    clients: Arc<RwLock<Clients>>,
    sync_queue: SyncQueue,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker. The store and client registry are shared with the
    /// host (and with any successor worker).
    pub fn new(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        store: SharedCacheStore,
        clients: Arc<RwLock<Clients>>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), WorkerError> {
        let router = StrategyRouter::new(
            fetcher.clone(),
            store.clone(),
            config.router_config()?,
            config.generation.clone(),
        );
        let sync_queue = SyncQueue::new(config.sync_policy.clone(), clock);
        let (events, event_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                config,
                state: RwLock::new(WorkerState::New),
                store,
                fetcher,
                router,
                clients,
                sync_queue,
                events,
            },
            event_rx,
        ))
    }

    /// The worker's generation name.
    pub fn version(&self) -> &str {
        &self.config.generation
    }

    /// The worker's configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The shared cache store.
    pub fn store(&self) -> &SharedCacheStore {
        &self.store
    }

    /// The background-sync queue.
    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync_queue
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, to: WorkerState) {
        let from = {
            let mut state = self.state.write().await;
            let from = *state;
            *state = to;
            from
        };
        debug!(?from, ?to, generation = %self.config.generation, "Worker state change");
        let _ = self.events.send(WorkerEvent::StateChange { from, to });
    }

    /// Register an open page with the shared registry.
    pub async fn add_client(&self, url: Url) -> Client {
        self.clients.write().await.add(url)
    }

    /// Install: open the current generation and pre-warm it with the
    /// manifest. Completes only after every entry is fetched and stored;
    /// any pre-warm failure fails the install and leaves the worker
    /// redundant.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Installing).await;

        match self.prewarm().await {
            Ok(()) => {}
            Err(e) => {
                warn!(generation = %self.config.generation, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                return Err(e);
            }
        }

        info!(
            generation = %self.config.generation,
            entries = self.config.precache_manifest.len(),
            "Pre-warm complete"
        );
        self.set_state(WorkerState::Installed).await;

        if self
            .clients
            .read()
            .await
            .any_controlled_by_other(&self.config.generation)
        {
            let _ = self.events.send(WorkerEvent::UpdateWaiting);
        }

        Ok(())
    }

    async fn prewarm(&self) -> Result<(), WorkerError> {
        self.store.open(&self.config.generation).await;

        for path in &self.config.precache_manifest {
            let url = self.config.resolve(path)?;
            let request = Request::get(url);

            let response =
                retry_with_backoff(&self.config.precache_retry, || self.fetcher.fetch(&request))
                    .await
                    .map_err(|e| WorkerError::InstallFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;

            if !response.ok() {
                return Err(WorkerError::InstallFailed {
                    path: path.clone(),
                    reason: format!("status {}", response.status),
                });
            }

            self.store
                .put(
                    &self.config.generation,
                    request.cache_key(),
                    response.to_stored(),
                )
                .await?;
        }

        Ok(())
    }

    /// Activate: garbage-collect every stale generation, then take control
    /// of all open pages.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Activating).await;

        let stale = self
            .store
            .delete_generations_except(&self.config.generation)
            .await;
        if !stale.is_empty() {
            info!(
                generation = %self.config.generation,
                removed = stale.len(),
                "Stale cache generations removed"
            );
        }

        let claimed = self.clients.write().await.claim(&self.config.generation);
        for client_id in claimed {
            let _ = self.events.send(WorkerEvent::ControllerChange { client_id });
        }

        self.set_state(WorkerState::Activated).await;
        Ok(())
    }

    /// Install then activate. Install fully settles before activate
    /// begins; the waiting hold is skipped so the new logic takes effect
    /// immediately.
    pub async fn run(&self) -> Result<(), WorkerError> {
        self.install().await?;
        self.activate().await
    }

    /// Promote an installed (waiting) worker immediately. A no-op in any
    /// other state.
    pub async fn skip_waiting(&self) -> Result<(), WorkerError> {
        if self.state().await == WorkerState::Installed {
            self.activate().await
        } else {
            Ok(())
        }
    }

    /// Handle an intercepted request. Only legal once activated.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, WorkerError> {
        if self.state().await != WorkerState::Activated {
            return Err(WorkerError::NotActive);
        }
        Ok(self.router.handle(request).await?)
    }

    /// Handle a control message from a page.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<(), WorkerError> {
        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await,
            ControlMessage::GetVersion { reply } => {
                let _ = reply.send(VersionReply {
                    version: self.config.generation.clone(),
                });
                Ok(())
            }
        }
    }

    /// Handle a sync trigger: drain the queue for the registered tag,
    /// ignore any other.
    pub async fn handle_sync(&self, tag: &str) -> SyncReport {
        if tag != self.config.sync_tag {
            debug!(tag, registered = %self.config.sync_tag, "Ignoring unknown sync tag");
            return SyncReport::default();
        }
        self.sync_queue.drain(self.fetcher.as_ref()).await
    }

    /// Render a push payload with the fixed notification template.
    pub fn handle_push(&self, payload: &[u8]) -> Notification {
        Notification::from_push_payload(payload)
    }

    /// Handle a notification action: view opens the configured route in a
    /// new client window, close does nothing.
    pub async fn handle_notification_action(
        &self,
        action: NotificationAction,
    ) -> Result<Option<Client>, WorkerError> {
        match action {
            NotificationAction::View => {
                let url = self.config.resolve(&self.config.notification_route)?;
                let client = self.clients.write().await.open_window(url);
                Ok(Some(client))
            }
            NotificationAction::Close => Ok(None),
        }
    }
}
