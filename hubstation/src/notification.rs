//! Download notifications.
//!
//! Delivery to users happens elsewhere; this module only publishes events on a
//! broadcast channel for whoever subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::downloader::model::MediaInfo;

/// Default channel capacity for notification events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of a submission, as seen by listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    DownloadSucceeded {
        media: MediaInfo,
        backend_id: String,
        backend_name: String,
        setting_name: Option<String>,
        /// Where the request came from, e.g. `rss` or `web`.
        origin: Option<String>,
        user_name: Option<String>,
        timestamp: DateTime<Utc>,
    },
    DownloadFailed {
        media: MediaInfo,
        reason: String,
        origin: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DownloadSucceeded { .. } => "download_succeeded",
            Self::DownloadFailed { .. } => "download_failed",
        }
    }

    pub fn media(&self) -> &MediaInfo {
        match self {
            Self::DownloadSucceeded { media, .. } | Self::DownloadFailed { media, .. } => media,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::DownloadSucceeded {
                media,
                backend_name,
                ..
            } => format!("Added {} to {}", media.title, backend_name),
            Self::DownloadFailed { media, reason, .. } => {
                format!("Failed to add {}: {}", media.title, reason)
            }
        }
    }
}

/// Fire-and-forget notification sink.
pub trait Notifier: Send + Sync {
    fn send(&self, event: NotificationEvent);
}

/// Publishes events on a tokio broadcast channel.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotificationEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn send(&self, event: NotificationEvent) {
        tracing::debug!(event = event.event_type(), "{}", event.description());
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}
