//! Push-notification delivery seam.
//!
//! Push delivery to offline devices is an external collaborator; this
//! module defines the trait the dispatch coordinator talks to and a
//! logging implementation used by default and in tests. A production
//! binary injects a real sender (FCM or similar) behind the same trait.

use async_trait::async_trait;
use serde::Serialize;

use ridewire_core::types::DbId;

/// Error type for push delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The provider rejected or failed to accept the notification.
    #[error("Push delivery failed: {0}")]
    Delivery(String),
}

/// A notification destined for a principal's device.
#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    /// Structured data the mobile app uses to deep-link (ride id, event
    /// type, ...).
    pub data: serde_json::Value,
}

/// Sends push notifications to principals that may not hold a live
/// realtime connection.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        principal_id: DbId,
        notification: &PushNotification,
    ) -> Result<(), PushError>;
}

/// Default sender: logs the notification instead of delivering it.
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(
        &self,
        principal_id: DbId,
        notification: &PushNotification,
    ) -> Result<(), PushError> {
        tracing::debug!(
            principal_id,
            title = %notification.title,
            "Push delivery skipped (no sender configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogPushSender;
        let notification = PushNotification {
            title: "Nouvelle course disponible".to_string(),
            body: "Pickup at Place de la Gare".to_string(),
            data: serde_json::json!({"rideId": 42}),
        };
        assert!(sender.send(7, &notification).await.is_ok());
    }
}
