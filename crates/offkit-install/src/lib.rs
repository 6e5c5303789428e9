//! # Offkit Install
//!
//! Client-side installability tracking for the Offkit offline caching
//! layer.
//!
//! ## Features
//!
//! - **Install eligibility**: captures and defers the platform's native
//!   prompt; at most one show per captured prompt
//! - **Update flow**: skip-waiting signal plus a one-shot reload armed to
//!   fire only after control transfers
//! - **Connectivity**: mirrors the platform's online/offline signal
//!
//! The tracker owns no platform plumbing: the native prompt, the worker
//! control channel, and the page reload are trait seams wired in by the
//! host.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

// ==================== Errors ====================

/// Installability errors.
#[derive(Error, Debug, Clone)]
pub enum InstallError {
    #[error("Prompt failed: {0}")]
    PromptFailed(String),
}

// ==================== Seams ====================

/// Outcome of showing the native install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user accepted the install.
    Accepted,
    /// The user dismissed the prompt.
    Dismissed,
}

/// The deferred native install prompt.
#[async_trait]
pub trait InstallPrompt: Send + Sync {
    /// Show the prompt and wait for the user's choice.
    async fn show(&self) -> Result<PromptOutcome, InstallError>;
}

/// Control channel to the worker lifecycle.
pub trait WorkerController: Send + Sync {
    /// Ask a waiting worker to activate immediately.
    fn skip_waiting(&self);
}

/// Page reload seam.
pub trait PageReloader: Send + Sync {
    /// Reload the page.
    fn reload(&self);
}

// ==================== State & Events ====================

/// Observable installability state, read by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallabilityState {
    /// An install prompt has been captured and can be shown.
    pub installable: bool,
    /// The app is installed.
    pub installed: bool,
    /// The platform reports network connectivity.
    pub online: bool,
    /// A new worker is waiting to take over.
    pub update_available: bool,
}

impl Default for InstallabilityState {
    fn default() -> Self {
        Self {
            installable: false,
            installed: false,
            online: true,
            update_available: false,
        }
    }
}

/// Platform signals consumed by the tracker.
pub enum PlatformEvent {
    /// The platform offered an install prompt; it is captured and
    /// deferred, never shown eagerly.
    InstallPromptAvailable(Arc<dyn InstallPrompt>),
    /// The install completed (from the platform, not our prompt flow).
    AppInstalled,
    /// Connectivity changed.
    ConnectivityChanged(bool),
    /// A new worker reached the waiting state behind an active one.
    UpdateWaiting,
    /// Page control transferred to a new worker.
    ControllerChanged,
}

impl std::fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformEvent::InstallPromptAvailable(_) => f.write_str("InstallPromptAvailable"),
            PlatformEvent::AppInstalled => f.write_str("AppInstalled"),
            PlatformEvent::ConnectivityChanged(online) => {
                write!(f, "ConnectivityChanged({online})")
            }
            PlatformEvent::UpdateWaiting => f.write_str("UpdateWaiting"),
            PlatformEvent::ControllerChanged => f.write_str("ControllerChanged"),
        }
    }
}

// ==================== Tracker ====================

/// Mirrors platform install/update/connectivity signals into observable
/// state and exposes the imperative install/update/dismiss actions.
pub struct InstallTracker {
    state: InstallabilityState,
    pending_prompt: Option<Arc<dyn InstallPrompt>>,
    reload_pending: bool,
    controller: Arc<dyn WorkerController>,
    reloader: Arc<dyn PageReloader>,
}

impl InstallTracker {
    /// Create a tracker wired to the given worker control and reload seams.
    pub fn new(controller: Arc<dyn WorkerController>, reloader: Arc<dyn PageReloader>) -> Self {
        Self {
            state: InstallabilityState::default(),
            pending_prompt: None,
            reload_pending: false,
            controller,
            reloader,
        }
    }

    /// Current observable state.
    pub fn state(&self) -> InstallabilityState {
        self.state
    }

    /// Feed a platform signal into the tracker.
    pub fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::InstallPromptAvailable(prompt) => {
                debug!("Captured install prompt");
                self.pending_prompt = Some(prompt);
                self.state.installable = true;
            }
            PlatformEvent::AppInstalled => {
                self.state.installed = true;
                self.state.installable = false;
                self.pending_prompt = None;
            }
            PlatformEvent::ConnectivityChanged(online) => {
                self.state.online = online;
            }
            PlatformEvent::UpdateWaiting => {
                self.state.update_available = true;
            }
            PlatformEvent::ControllerChanged => {
                // Reload exactly once, and only after the swap.
                if self.reload_pending {
                    self.reload_pending = false;
                    self.state.update_available = false;
                    self.reloader.reload();
                }
            }
        }
    }

    /// Show the deferred install prompt.
    ///
    /// Returns `false` immediately when no prompt is captured. The prompt
    /// is consumed either way: at most one show per captured signal.
    pub async fn install_app(&mut self) -> bool {
        let Some(prompt) = self.pending_prompt.take() else {
            debug!("Install requested with no captured prompt");
            return false;
        };

        match prompt.show().await {
            Ok(PromptOutcome::Accepted) => {
                self.state.installable = false;
                true
            }
            Ok(PromptOutcome::Dismissed) => {
                debug!("Install prompt dismissed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Install prompt failed");
                false
            }
        }
    }

    /// Promote a waiting update and arm a one-shot reload that fires on
    /// the controller-change signal — after the swap, never before.
    ///
    /// A no-op returning `false` when no update is waiting.
    pub fn update_app(&mut self) -> bool {
        if !self.state.update_available {
            return false;
        }
        self.controller.skip_waiting();
        self.reload_pending = true;
        true
    }

    /// Clear installable state without showing the prompt (the user
    /// declined via custom UI).
    pub fn dismiss_install(&mut self) {
        self.pending_prompt = None;
        self.state.installable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockPrompt {
        outcome: Result<PromptOutcome, InstallError>,
        shows: AtomicU32,
    }

    impl MockPrompt {
        fn accepting() -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(PromptOutcome::Accepted),
                shows: AtomicU32::new(0),
            })
        }

        fn dismissing() -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(PromptOutcome::Dismissed),
                shows: AtomicU32::new(0),
            })
        }

        fn shows(&self) -> u32 {
            self.shows.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InstallPrompt for MockPrompt {
        async fn show(&self) -> Result<PromptOutcome, InstallError> {
            self.shows.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct RecordingController {
        skips: AtomicU32,
    }

    impl WorkerController for RecordingController {
        fn skip_waiting(&self) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingReloader {
        reloads: AtomicU32,
    }

    impl PageReloader for RecordingReloader {
        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracker() -> (InstallTracker, Arc<RecordingController>, Arc<RecordingReloader>) {
        let controller = Arc::new(RecordingController::default());
        let reloader = Arc::new(RecordingReloader::default());
        (
            InstallTracker::new(controller.clone(), reloader.clone()),
            controller,
            reloader,
        )
    }

    #[tokio::test]
    async fn test_install_app_without_prompt_fails_cleanly() {
        let (mut tracker, _, _) = tracker();
        assert!(!tracker.install_app().await);
    }

    #[tokio::test]
    async fn test_install_app_accept_flow() {
        let (mut tracker, _, _) = tracker();
        let prompt = MockPrompt::accepting();
        tracker.handle_event(PlatformEvent::InstallPromptAvailable(prompt.clone()));
        assert!(tracker.state().installable);

        assert!(tracker.install_app().await);
        assert_eq!(prompt.shows(), 1);
        assert!(!tracker.state().installable);

        // The prompt is consumed: a second attempt fails without a show.
        assert!(!tracker.install_app().await);
        assert_eq!(prompt.shows(), 1);
    }

    #[tokio::test]
    async fn test_install_app_dismissal_consumes_prompt() {
        let (mut tracker, _, _) = tracker();
        let prompt = MockPrompt::dismissing();
        tracker.handle_event(PlatformEvent::InstallPromptAvailable(prompt.clone()));

        assert!(!tracker.install_app().await);
        assert_eq!(prompt.shows(), 1);

        assert!(!tracker.install_app().await);
        assert_eq!(prompt.shows(), 1);
    }

    #[tokio::test]
    async fn test_install_app_prompt_failure_is_a_boolean_failure() {
        let (mut tracker, _, _) = tracker();
        let prompt = Arc::new(MockPrompt {
            outcome: Err(InstallError::PromptFailed("platform denied".to_string())),
            shows: AtomicU32::new(0),
        });
        tracker.handle_event(PlatformEvent::InstallPromptAvailable(prompt));

        assert!(!tracker.install_app().await);
    }

    #[test]
    fn test_update_app_without_waiting_worker_is_noop() {
        let (mut tracker, controller, reloader) = tracker();

        assert!(!tracker.update_app());
        assert_eq!(controller.skips.load(Ordering::SeqCst), 0);

        // Even a controller change afterwards must not reload.
        tracker.handle_event(PlatformEvent::ControllerChanged);
        assert_eq!(reloader.reloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_app_reloads_once_after_controller_change() {
        let (mut tracker, controller, reloader) = tracker();
        tracker.handle_event(PlatformEvent::UpdateWaiting);
        assert!(tracker.state().update_available);

        assert!(tracker.update_app());
        assert_eq!(controller.skips.load(Ordering::SeqCst), 1);
        // Not yet: the reload waits for the swap.
        assert_eq!(reloader.reloads.load(Ordering::SeqCst), 0);

        tracker.handle_event(PlatformEvent::ControllerChanged);
        assert_eq!(reloader.reloads.load(Ordering::SeqCst), 1);
        assert!(!tracker.state().update_available);

        // A later controller change does not reload again.
        tracker.handle_event(PlatformEvent::ControllerChanged);
        assert_eq!(reloader.reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connectivity_mirrors_platform() {
        let (mut tracker, _, _) = tracker();
        assert!(tracker.state().online);

        tracker.handle_event(PlatformEvent::ConnectivityChanged(false));
        assert!(!tracker.state().online);

        tracker.handle_event(PlatformEvent::ConnectivityChanged(true));
        assert!(tracker.state().online);
    }

    #[tokio::test]
    async fn test_app_installed_clears_prompt() {
        let (mut tracker, _, _) = tracker();
        tracker.handle_event(PlatformEvent::InstallPromptAvailable(MockPrompt::accepting()));

        tracker.handle_event(PlatformEvent::AppInstalled);
        assert!(tracker.state().installed);
        assert!(!tracker.state().installable);
        assert!(!tracker.install_app().await);
    }

    #[tokio::test]
    async fn test_dismiss_install_clears_without_showing() {
        let (mut tracker, _, _) = tracker();
        let prompt = MockPrompt::accepting();
        tracker.handle_event(PlatformEvent::InstallPromptAvailable(prompt.clone()));

        tracker.dismiss_install();
        assert!(!tracker.state().installable);
        assert_eq!(prompt.shows(), 0);
        assert!(!tracker.install_app().await);
    }
}
