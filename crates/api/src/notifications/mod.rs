//! Event-to-push routing.
//!
//! [`PushRelay`] subscribes to the dispatch event bus and forwards each
//! event to the parties that should hear about it even without a live
//! realtime connection, through the external push-notification seam.

use std::sync::Arc;

use tokio::sync::broadcast;

use ridewire_core::types::DbId;
use ridewire_events::{PushNotification, PushSender, RideEvent};

/// Routes dispatch events to push notifications.
pub struct PushRelay {
    sender: Arc<dyn PushSender>,
}

impl PushRelay {
    pub fn new(sender: Arc<dyn PushSender>) -> Self {
        Self { sender }
    }

    /// Run the main routing loop.
    ///
    /// Consumes events from `receiver` until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<RideEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Push relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, push relay shutting down");
                    break;
                }
            }
        }
    }

    /// Decide who hears about one event and send.
    async fn route_event(&self, event: &RideEvent) {
        match event.event_type.as_str() {
            // Each candidate of a new offer round gets a device push so
            // the offer reaches drivers not currently on the app screen.
            "ride.offer_round" => {
                let candidates: Vec<DbId> = event
                    .payload
                    .get("candidateIds")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let notification = PushNotification {
                    title: "New ride available".to_string(),
                    body: "A ride request is waiting near you".to_string(),
                    data: serde_json::json!({
                        "type": "ride_request",
                        "rideId": event.ride_id,
                    }),
                };
                for driver_id in candidates {
                    self.deliver(driver_id, &notification).await;
                }
            }

            "ride.claimed" => {
                if let Some(client_id) = event.client_id {
                    let notification = PushNotification {
                        title: "Ride accepted".to_string(),
                        body: "A driver accepted your ride".to_string(),
                        data: serde_json::json!({
                            "type": "ride_accepted",
                            "rideId": event.ride_id,
                            "driverId": event.driver_id,
                        }),
                    };
                    self.deliver(client_id, &notification).await;
                }
            }

            "ride.progressed" => {
                if let Some(client_id) = event.client_id {
                    let status = event
                        .payload
                        .get("status")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let title = match status {
                        "driverArriving" => "Your driver is arriving",
                        "inProgress" => "Trip started",
                        "completed" => "Trip completed",
                        _ => "Ride update",
                    };
                    let notification = PushNotification {
                        title: title.to_string(),
                        body: "Your ride status changed".to_string(),
                        data: serde_json::json!({
                            "type": "ride_status_update",
                            "rideId": event.ride_id,
                            "status": status,
                        }),
                    };
                    self.deliver(client_id, &notification).await;
                }
            }

            "ride.cancelled" => {
                let notification = PushNotification {
                    title: "Ride cancelled".to_string(),
                    body: "The ride was cancelled".to_string(),
                    data: serde_json::json!({
                        "type": "ride_cancelled",
                        "rideId": event.ride_id,
                    }),
                };
                if let Some(client_id) = event.client_id {
                    self.deliver(client_id, &notification).await;
                }
                if let Some(driver_id) = event.driver_id {
                    self.deliver(driver_id, &notification).await;
                }
            }

            "ride.unmatched" => {
                if let Some(client_id) = event.client_id {
                    let notification = PushNotification {
                        title: "Still searching".to_string(),
                        body: "No driver is available right now".to_string(),
                        data: serde_json::json!({
                            "type": "no_driver_available",
                            "rideId": event.ride_id,
                        }),
                    };
                    self.deliver(client_id, &notification).await;
                }
            }

            _ => {}
        }
    }

    async fn deliver(&self, principal_id: DbId, notification: &PushNotification) {
        if let Err(e) = self.sender.send(principal_id, notification).await {
            tracing::warn!(principal_id, error = %e, "Push delivery failed");
        }
    }
}
