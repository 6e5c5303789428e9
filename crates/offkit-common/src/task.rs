//! Detached background tasks.
//!
//! Fire-and-forget work (cache write-through, write-back) runs on a detached
//! task: the caller returns immediately and the task's failure is logged
//! rather than surfaced. Tests hold on to the returned handle to await
//! completion deterministically.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::OffkitError;

/// Handle to a detached background task.
#[derive(Debug)]
pub struct DetachedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl DetachedTask {
    /// The task's name (for logs).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the task to finish. Failures were already logged.
    pub async fn finished(self) {
        let _ = self.handle.await;
    }

    /// Abort the task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Spawn background work whose result is never awaited by the caller.
///
/// An `Err` outcome is logged at warn level and otherwise swallowed; the
/// primary response path is unaffected.
pub fn spawn_detached<F>(name: &'static str, future: F) -> DetachedTask
where
    F: Future<Output = Result<(), OffkitError>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        if let Err(e) = future.await {
            warn!(task = name, category = e.category(), error = %e, "Detached task failed");
        }
    });

    DetachedTask { name, handle }
}
