//! Background-sync retry queue.
//!
//! Requests that failed while offline wait in a dedicated store until a
//! sync trigger drains the queue. A resolved response clears an entry
//! regardless of status — only transport failures re-queue it. By default
//! entries are retained indefinitely; an optional attempt cap drops an
//! entry after N failed drains.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use offkit_common::Clock;
use offkit_fetch::{Fetcher, Request};

/// Retention policy for queued requests.
#[derive(Debug, Clone, Default)]
pub struct SyncPolicy {
    /// Drop an entry after this many failed retries (None = retain
    /// indefinitely, the default).
    pub max_attempts: Option<u32>,
}

impl SyncPolicy {
    /// Retain entries indefinitely.
    pub fn indefinite() -> Self {
        Self { max_attempts: None }
    }

    /// Drop entries after a fixed number of failed retries.
    pub fn capped(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }
}

/// A queued request awaiting retry.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Queue entry ID.
    pub id: u64,

    /// The failed request.
    pub request: Request,

    /// Failed retry count so far.
    pub attempts: u32,

    /// Enqueue timestamp (ms since epoch).
    pub queued_at_ms: u64,
}

/// Result of one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries retried this drain.
    pub attempted: usize,
    /// Entries whose retry resolved (removed from the queue).
    pub succeeded: usize,
    /// Entries whose retry failed and were kept.
    pub requeued: usize,
    /// Entries dropped by the attempt cap.
    pub dropped: usize,
}

/// The pending-failed-request store.
pub struct SyncQueue {
    entries: Mutex<VecDeque<PendingRequest>>,
    next_id: AtomicU64,
    policy: SyncPolicy,
    clock: Arc<dyn Clock>,
}

impl SyncQueue {
    /// Create an empty queue.
    pub fn new(policy: SyncPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            policy,
            clock,
        }
    }

    /// Queue a failed request for retry; returns the entry ID.
    pub async fn enqueue(&self, request: Request) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = PendingRequest {
            id,
            request,
            attempts: 0,
            queued_at_ms: self.clock.now_ms(),
        };
        debug!(id, url = %entry.request.url, "Queued failed request");
        self.entries.lock().await.push_back(entry);
        id
    }

    /// Number of queued entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Retry every queued entry once, sequentially.
    ///
    /// One entry's failure never blocks the rest. Entries enqueued while
    /// the drain runs are kept behind the retained ones and are not
    /// retried until the next drain.
    pub async fn drain(&self, fetcher: &dyn Fetcher) -> SyncReport {
        let mut pending: VecDeque<PendingRequest> = {
            let mut entries = self.entries.lock().await;
            entries.drain(..).collect()
        };

        let mut report = SyncReport::default();
        let mut retained = VecDeque::new();

        while let Some(mut entry) = pending.pop_front() {
            report.attempted += 1;
            match fetcher.fetch(&entry.request).await {
                Ok(response) => {
                    report.succeeded += 1;
                    debug!(id = entry.id, status = %response.status, "Queued request replayed");
                }
                Err(e) => {
                    entry.attempts += 1;
                    if let Some(max) = self.policy.max_attempts {
                        if entry.attempts >= max {
                            warn!(
                                id = entry.id,
                                attempts = entry.attempts,
                                error = %e,
                                "Dropping queued request at attempt cap"
                            );
                            report.dropped += 1;
                            continue;
                        }
                    }
                    debug!(id = entry.id, attempts = entry.attempts, error = %e, "Retry failed, keeping entry");
                    report.requeued += 1;
                    retained.push_back(entry);
                }
            }
        }

        {
            let mut entries = self.entries.lock().await;
            let newly_queued: Vec<PendingRequest> = entries.drain(..).collect();
            *entries = retained;
            entries.extend(newly_queued);
        }

        report
    }
}
