//! Repository for the `driver_presence` table.
//!
//! One row per driver, upserted on every location report. Availability
//! changes that matter for dispatch correctness (claiming a driver for a
//! ride, releasing them) are conditional updates so a driver can never be
//! attached to two rides at once.

use sqlx::PgPool;

use ridewire_core::presence::DriverStatus;
use ridewire_core::types::DbId;

use crate::models::presence::{DriverPresence, LocationReport};

/// Column list for `driver_presence` queries.
const COLUMNS: &str = "\
    driver_id, latitude, longitude, heading, speed_kmh, \
    status, current_ride_id, reported_at, updated_at";

/// Provides presence and availability operations for drivers.
pub struct PresenceRepo;

impl PresenceRepo {
    /// Record a location report, creating the row on first contact.
    ///
    /// A report from an `offline` driver with no active ride revives them
    /// to `available`; any other stored status is preserved so a report
    /// mid-ride cannot clobber `en_route_to_pickup`/`busy`.
    pub async fn report(
        pool: &PgPool,
        driver_id: DbId,
        report: &LocationReport,
    ) -> Result<DriverPresence, sqlx::Error> {
        let query = format!(
            "INSERT INTO driver_presence \
                 (driver_id, latitude, longitude, heading, speed_kmh, reported_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (driver_id) DO UPDATE SET \
                 latitude = EXCLUDED.latitude, \
                 longitude = EXCLUDED.longitude, \
                 heading = EXCLUDED.heading, \
                 speed_kmh = EXCLUDED.speed_kmh, \
                 reported_at = NOW(), \
                 updated_at = NOW(), \
                 status = CASE \
                     WHEN driver_presence.status = 'offline' THEN 'available' \
                     ELSE driver_presence.status \
                 END \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(report.position.latitude)
            .bind(report.position.longitude)
            .bind(report.heading)
            .bind(report.speed_kmh)
            .fetch_one(pool)
            .await
    }

    /// Toggle a driver's availability.
    ///
    /// Going offline is refused while a ride is attached (the guard makes
    /// this atomic -- no read-then-write window). Returns `None` when the
    /// guard fails or the driver has never reported.
    pub async fn set_availability(
        pool: &PgPool,
        driver_id: DbId,
        online: bool,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let target = if online {
            DriverStatus::Available
        } else {
            DriverStatus::Offline
        };
        let query = format!(
            "UPDATE driver_presence \
             SET status = $2, updated_at = NOW() \
             WHERE driver_id = $1 AND current_ride_id IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(target.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Atomically attach an available driver to a ride.
    ///
    /// The `status = 'available' AND current_ride_id IS NULL` precondition
    /// guarantees a driver holds at most one ride; a second claim for the
    /// same driver updates zero rows.
    pub async fn claim_for_ride(
        pool: &PgPool,
        driver_id: DbId,
        ride_id: DbId,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let query = format!(
            "UPDATE driver_presence \
             SET status = $3, current_ride_id = $2, updated_at = NOW() \
             WHERE driver_id = $1 AND status = $4 AND current_ride_id IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(ride_id)
            .bind(DriverStatus::EnRouteToPickup.as_str())
            .bind(DriverStatus::Available.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark a driver as busy (trip started). Keyed on both ids so only
    /// the attachment created by the winning claim is touched.
    pub async fn mark_busy(
        pool: &PgPool,
        driver_id: DbId,
        ride_id: DbId,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let query = format!(
            "UPDATE driver_presence \
             SET status = $3, updated_at = NOW() \
             WHERE driver_id = $1 AND current_ride_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(ride_id)
            .bind(DriverStatus::Busy.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Detach one specific driver from one specific ride.
    ///
    /// This is the compensation path for a claim whose ride CAS lost after
    /// its presence CAS won: during the race window two drivers can be
    /// transiently attached to the same ride id, so the release must name
    /// the driver to avoid detaching the winner.
    pub async fn release_driver(
        pool: &PgPool,
        driver_id: DbId,
        ride_id: DbId,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let query = format!(
            "UPDATE driver_presence \
             SET status = $3, current_ride_id = NULL, updated_at = NOW() \
             WHERE driver_id = $1 AND current_ride_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(ride_id)
            .bind(DriverStatus::Available.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Release every driver attached to `ride_id` back to `available`.
    ///
    /// Used when the ride terminates (cancelled or completed): nobody may
    /// stay attached to a dead ride, including a transiently-attached
    /// losing claimant that has not been compensated yet.
    pub async fn release_from_ride(
        pool: &PgPool,
        ride_id: DbId,
    ) -> Result<Vec<DriverPresence>, sqlx::Error> {
        let query = format!(
            "UPDATE driver_presence \
             SET status = $2, current_ride_id = NULL, updated_at = NOW() \
             WHERE current_ride_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(ride_id)
            .bind(DriverStatus::Available.as_str())
            .fetch_all(pool)
            .await
    }

    pub async fn get(
        pool: &PgPool,
        driver_id: DbId,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM driver_presence WHERE driver_id = $1");
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .fetch_optional(pool)
            .await
    }

    /// Latest presence for a driver, only if refreshed within `ttl_secs`.
    ///
    /// A stale record is indistinguishable from a missing one: the driver
    /// is "presence unknown" and callers must not emit its coordinates.
    pub async fn get_fresh(
        pool: &PgPool,
        driver_id: DbId,
        ttl_secs: f64,
    ) -> Result<Option<DriverPresence>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM driver_presence \
             WHERE driver_id = $1 AND reported_at > NOW() - make_interval(secs => $2)"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(driver_id)
            .bind(ttl_secs)
            .fetch_optional(pool)
            .await
    }

    /// All drivers currently dispatchable: `available` and fresh.
    ///
    /// The freshness predicate lives in the query so a stale "available"
    /// flag can never leak a gone driver into an offer round.
    pub async fn list_fresh_available(
        pool: &PgPool,
        ttl_secs: f64,
    ) -> Result<Vec<DriverPresence>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM driver_presence \
             WHERE status = $1 AND current_ride_id IS NULL \
               AND reported_at > NOW() - make_interval(secs => $2)"
        );
        sqlx::query_as::<_, DriverPresence>(&query)
            .bind(DriverStatus::Available.as_str())
            .bind(ttl_secs)
            .fetch_all(pool)
            .await
    }
}
