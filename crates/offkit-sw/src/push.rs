//! Push notifications.
//!
//! Incoming push payloads are rendered with a fixed template: the payload
//! supplies title and body text (defaults fill any gap) and every
//! notification carries the same two actions, view and close.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default notification title.
pub const DEFAULT_TITLE: &str = "Citizen Services Portal";

/// Default notification body.
pub const DEFAULT_BODY: &str = "You have a new update from the portal.";

/// Parsed push payload. Unknown fields are ignored; an unparseable
/// payload falls back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushPayload {
    /// Optional notification title.
    pub title: Option<String>,
    /// Optional notification body.
    pub body: Option<String>,
}

/// Notification actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    /// Open the application route in a client window.
    View,
    /// Dismiss the notification.
    Close,
}

impl NotificationAction {
    /// Action identifier on the wire.
    pub fn id(&self) -> &'static str {
        match self {
            NotificationAction::View => "view",
            NotificationAction::Close => "close",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::View => "View",
            NotificationAction::Close => "Close",
        }
    }
}

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Title text.
    pub title: String,
    /// Body text.
    pub body: String,
    /// The fixed action pair.
    pub actions: [NotificationAction; 2],
}

impl Notification {
    /// Render a push payload with the fixed template.
    pub fn from_push_payload(payload: &[u8]) -> Self {
        let parsed: PushPayload = serde_json::from_slice(payload).unwrap_or_else(|e| {
            debug!(error = %e, "Unparseable push payload, using defaults");
            PushPayload::default()
        });

        Self {
            title: parsed.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: parsed.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            actions: [NotificationAction::View, NotificationAction::Close],
        }
    }
}
