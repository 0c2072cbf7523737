//! Geofencing math.
//!
//! Pure functions over two coordinates and a threshold; no I/O. Callers
//! always supply the driver's most recent self-reported position from the
//! current request, never a cached value, so a stale coordinate cannot
//! pass the check after the driver has moved away.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Mean earth radius in meters (WGS-84).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject NaN/infinite values and out-of-range coordinates.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(CoreError::Validation(
                "Coordinates must be finite numbers".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoreError::Validation(format!(
                "Latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoreError::Validation(format!(
                "Longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Whether `a` and `b` are within `radius_m` meters of each other.
pub fn within_radius(a: GeoPoint, b: GeoPoint, radius_m: f64) -> bool {
    haversine_distance_m(a, b) <= radius_m
}

/// Gate a state transition on driver proximity to a reference point.
///
/// Returns the measured distance on success so callers can log it.
pub fn check_proximity(
    driver: GeoPoint,
    reference: GeoPoint,
    max_allowed_m: f64,
) -> Result<f64, CoreError> {
    let distance_m = haversine_distance_m(driver, reference);
    if distance_m > max_allowed_m {
        return Err(CoreError::Geofence {
            distance_m,
            max_allowed_m,
        });
    }
    Ok(distance_m)
}
