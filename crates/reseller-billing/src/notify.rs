//! Notification delivery sink
//!
//! Fire-and-forget from the engine's side. Email delivery is not built;
//! [`LoggingNotificationSink`] writes one log event per message.

use async_trait::async_trait;
use parking_lot::Mutex;
use reseller_common::UserId;
use tracing::info;

/// Delivery channel for user-facing messages
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message; failures are the sink's to log
    async fn notify(&self, user: &UserId, title: &str, message: &str);
}

/// Logs each notification
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, user: &UserId, title: &str, message: &str) {
        info!(user = %user, title = %title, message = %message, "Notification sent");
    }
}

/// Delivered message, as seen by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SentNotification {
    pub user: UserId,
    pub title: String,
    pub message: String,
}

/// Keeps every delivered message in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, oldest first
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, user: &UserId, title: &str, message: &str) {
        self.sent.lock().push(SentNotification {
            user: user.clone(),
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
