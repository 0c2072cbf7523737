//! Driver operational statuses and presence freshness rules.
//!
//! A presence record is refreshed by every location report. A record that
//! has not been refreshed within the staleness TTL is treated as offline,
//! whatever its stored status says -- freshness is always evaluated at
//! read time, never trusted from a cached flag.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Operational status of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    EnRouteToPickup,
    Busy,
    Offline,
}

impl DriverStatus {
    /// Database/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::EnRouteToPickup => "en_route_to_pickup",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    /// Statuses that imply a non-null current ride.
    pub fn is_on_ride(self) -> bool {
        matches!(self, Self::EnRouteToPickup | Self::Busy)
    }
}

impl FromStr for DriverStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "en_route_to_pickup" => Ok(Self::EnRouteToPickup),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(CoreError::Internal(format!(
                "Unknown driver status: {other}"
            ))),
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a presence captured at `reported_at` is still fresh at `now`.
pub fn is_fresh(reported_at: Timestamp, now: Timestamp, ttl_secs: i64) -> bool {
    now - reported_at <= Duration::seconds(ttl_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn fresh_within_ttl_stale_beyond() {
        let now = Utc::now();
        assert!(is_fresh(now - Duration::seconds(10), now, 45));
        assert!(is_fresh(now, now, 45));
        assert!(!is_fresh(now - Duration::seconds(46), now, 45));
    }

    #[test]
    fn on_ride_statuses() {
        assert!(DriverStatus::EnRouteToPickup.is_on_ride());
        assert!(DriverStatus::Busy.is_on_ride());
        assert!(!DriverStatus::Available.is_on_ride());
        assert!(!DriverStatus::Offline.is_on_ride());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DriverStatus::Available,
            DriverStatus::EnRouteToPickup,
            DriverStatus::Busy,
            DriverStatus::Offline,
        ] {
            assert_eq!(status.as_str().parse::<DriverStatus>().unwrap(), status);
        }
    }
}
