//! Wire protocol for the realtime channels.
//!
//! Every outbound event carries a `type` tag, the affected ride or driver
//! id, and a timestamp; ride events additionally carry the ride version so
//! a client that misses one delivery and catches the next is never left in
//! an inconsistent view. No payload implies success by absence of an
//! error. Field casing is camelCase to match the mobile apps.

use axum::extract::ws::{Message, Utf8Bytes};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_core::ride::RideStatus;
use ridewire_core::types::{DbId, Timestamp};
use ridewire_db::models::presence::DriverPresence;
use ridewire_db::models::ride::Ride;

use crate::error::error_code;

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// The ride fields a candidate driver needs to decide on an offer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideSummary {
    pub id: DbId,
    pub pickup: GeoPoint,
    pub pickup_address: Option<String>,
    pub dropoff: GeoPoint,
    pub dropoff_address: Option<String>,
    pub estimated_price: f64,
    pub created_at: Timestamp,
}

impl From<&Ride> for RideSummary {
    fn from(ride: &Ride) -> Self {
        Self {
            id: ride.id,
            pickup: ride.pickup(),
            pickup_address: ride.pickup_address.clone(),
            dropoff: ride.dropoff(),
            dropoff_address: ride.dropoff_address.clone(),
            estimated_price: ride.estimated_price,
            created_at: ride.created_at,
        }
    }
}

/// A driver position as carried by `driver_location_update`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed_kmh: f64,
}

impl From<&DriverPresence> for LocationPayload {
    fn from(presence: &DriverPresence) -> Self {
        Self {
            latitude: presence.latitude,
            longitude: presence.longitude,
            heading: presence.heading,
            speed_kmh: presence.speed_kmh,
        }
    }
}

/// Events the server emits on either channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake acknowledgement.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        principal_id: DbId,
        role: String,
        timestamp: Timestamp,
    },

    /// Keep-alive acknowledgement.
    #[serde(rename = "pong", rename_all = "camelCase")]
    Pong { timestamp: Timestamp },

    /// A ride offer, delivered to each candidate's driver room.
    #[serde(rename = "ride_request", rename_all = "camelCase")]
    RideRequest {
        ride: RideSummary,
        expires_at: Timestamp,
        timestamp: Timestamp,
    },

    /// The offer is gone (claimed by someone else, cancelled, or expired).
    #[serde(rename = "ride_withdrawn", rename_all = "camelCase")]
    RideWithdrawn { ride_id: DbId, timestamp: Timestamp },

    /// Lifecycle change, delivered to the ride room and the assigned
    /// driver's room.
    #[serde(rename = "ride:status:changed", rename_all = "camelCase")]
    RideStatusChanged {
        ride_id: DbId,
        status: RideStatus,
        driver_id: Option<DbId>,
        version: i64,
        timestamp: Timestamp,
    },

    /// Offer round progress, delivered to the ride room.
    #[serde(rename = "searching_drivers", rename_all = "camelCase")]
    SearchingDrivers {
        ride_id: DbId,
        drivers_notified: usize,
        round: u32,
        timestamp: Timestamp,
    },

    /// Every offer round expired unanswered; the ride stays pending.
    #[serde(rename = "no_driver_available", rename_all = "camelCase")]
    NoDriverAvailable { ride_id: DbId, timestamp: Timestamp },

    /// Live driver position, delivered to the ride room. `reportedAt` is
    /// the capture timestamp; receivers discard older updates.
    #[serde(rename = "driver_location_update", rename_all = "camelCase")]
    DriverLocationUpdate {
        ride_id: DbId,
        driver_id: DbId,
        location: LocationPayload,
        reported_at: Timestamp,
        timestamp: Timestamp,
    },

    /// Acknowledges a successful `ride:join`.
    #[serde(rename = "ride_joined", rename_all = "camelCase")]
    RideJoined { ride_id: DbId, timestamp: Timestamp },

    /// Typed failure for an inbound event.
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        timestamp: Timestamp,
    },
}

impl ServerEvent {
    /// Serialize into a WebSocket text frame.
    pub fn to_message(&self) -> Message {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"type\":\"error\",\"message\":\"encode: {e}\"}}"));
        Message::Text(Utf8Bytes::from(json))
    }

    /// Build a typed `error` event from a domain error.
    pub fn from_error(err: &CoreError) -> Self {
        Self::Error {
            code: error_code(err).to_string(),
            message: err.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Messages accepted on the client channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Start watching a ride (ownership is verified server-side).
    #[serde(rename = "ride:join", rename_all = "camelCase")]
    JoinRide { ride_id: DbId },

    /// Stop watching a ride.
    #[serde(rename = "ride:leave", rename_all = "camelCase")]
    LeaveRide { ride_id: DbId },

    /// Keep-alive.
    #[serde(rename = "ping")]
    Ping,
}

/// Messages accepted on the driver channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum DriverMessage {
    /// Claim an offered ride.
    #[serde(rename = "ride:accept", rename_all = "camelCase")]
    Accept { ride_id: DbId },

    /// Withdraw from the current offer round.
    #[serde(rename = "ride:refuse", rename_all = "camelCase")]
    Refuse { ride_id: DbId },

    /// Advance the ride lifecycle. Carries the driver's position at the
    /// moment of the request for the geofence gate.
    #[serde(rename = "ride:status:update", rename_all = "camelCase")]
    UpdateStatus {
        ride_id: DbId,
        status: RideStatus,
        location: GeoPoint,
        final_price: Option<f64>,
    },

    /// Periodic position report.
    #[serde(rename = "location:report", rename_all = "camelCase")]
    ReportLocation {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        heading: f64,
        #[serde(default)]
        speed_kmh: f64,
    },

    /// Keep-alive.
    #[serde(rename = "ping")]
    Ping,
}
