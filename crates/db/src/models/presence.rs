//! Driver presence entity and report struct.

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_core::presence::DriverStatus;
use ridewire_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `driver_presence` table: the latest known position and
/// operational status for one driver.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DriverPresence {
    pub driver_id: DbId,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed_kmh: f64,
    pub status: String,
    pub current_ride_id: Option<DbId>,
    /// When the driver captured this position.
    pub reported_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DriverPresence {
    /// Parse the stored status string.
    pub fn status(&self) -> Result<DriverStatus, CoreError> {
        self.status.parse()
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A single location report from a driver device.
#[derive(Debug, Clone, Copy)]
pub struct LocationReport {
    pub position: GeoPoint,
    pub heading: f64,
    pub speed_kmh: f64,
}
