//! Ride entity and insert struct.

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_core::ride::RideStatus;
use ridewire_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `rides` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ride {
    pub id: DbId,
    pub client_id: DbId,
    pub driver_id: Option<DbId>,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub pickup_address: Option<String>,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
    pub dropoff_address: Option<String>,
    pub status: String,
    pub estimated_price: f64,
    pub final_price: Option<f64>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub rating: Option<i16>,
    pub comment: Option<String>,
    /// Incremented on every transition; the optimistic-concurrency guard
    /// and the monotonic version carried by outbound events.
    pub version: i64,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Ride {
    /// Parse the stored status string.
    pub fn status(&self) -> Result<RideStatus, CoreError> {
        self.status.parse()
    }

    pub fn pickup(&self) -> GeoPoint {
        GeoPoint::new(self.pickup_lat, self.pickup_lon)
    }

    pub fn dropoff(&self) -> GeoPoint {
        GeoPoint::new(self.dropoff_lat, self.dropoff_lon)
    }
}

/// Input for `RideRepo::create`. The estimated price comes from the
/// pricing collaborator at intake time.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub client_id: DbId,
    pub pickup: GeoPoint,
    pub pickup_address: Option<String>,
    pub dropoff: GeoPoint,
    pub dropoff_address: Option<String>,
    pub estimated_price: f64,
}
