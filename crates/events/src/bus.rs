//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`RideEvent`]s. The
//! dispatch coordinator publishes every lifecycle outcome here; the push
//! relay (and any future consumer) subscribes independently. It is shared
//! via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ridewire_core::types::DbId;

// ---------------------------------------------------------------------------
// RideEvent
// ---------------------------------------------------------------------------

/// A dispatch event that occurred on the platform.
///
/// Constructed via [`RideEvent::new`] and enriched with the builder
/// methods [`with_ride`](RideEvent::with_ride),
/// [`with_driver`](RideEvent::with_driver),
/// [`with_client`](RideEvent::with_client), and
/// [`with_payload`](RideEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    /// Dot-separated event name, e.g. `"ride.claimed"`.
    pub event_type: String,

    /// The ride this event concerns, if any.
    pub ride_id: Option<DbId>,

    /// The driver this event concerns, if any.
    pub driver_id: Option<DbId>,

    /// The client this event concerns, if any.
    pub client_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl RideEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ride_id: None,
            driver_id: None,
            client_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_ride(mut self, ride_id: DbId) -> Self {
        self.ride_id = Some(ride_id);
        self
    }

    pub fn with_driver(mut self, driver_id: DbId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_client(mut self, client_id: DbId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`RideEvent`].
pub struct EventBus {
    sender: broadcast::Sender<RideEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the durable record of what happened is the ride row itself.
    pub fn publish(&self, event: RideEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<RideEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = RideEvent::new("ride.claimed")
            .with_ride(42)
            .with_driver(7)
            .with_client(3)
            .with_payload(serde_json::json!({"version": 2}));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "ride.claimed");
        assert_eq!(received.ride_id, Some(42));
        assert_eq!(received.driver_id, Some(7));
        assert_eq!(received.client_id, Some(3));
        assert_eq!(received.payload["version"], 2);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(RideEvent::new("ride.requested"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event_type, "ride.requested");
        assert_eq!(e2.event_type, "ride.requested");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(RideEvent::new("ride.cancelled"));
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = RideEvent::new("ride.requested");
        assert!(event.ride_id.is_none());
        assert!(event.driver_id.is_none());
        assert!(event.client_id.is_none());
        assert!(event.payload.is_object());
    }
}
