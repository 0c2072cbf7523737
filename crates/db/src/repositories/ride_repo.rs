//! Repository for the `rides` table.
//!
//! Every lifecycle mutation is a single `UPDATE ... WHERE status = <expected>`
//! compare-and-set. Under N concurrent claim attempts for the same ride
//! exactly one statement matches the precondition; the others update zero
//! rows and surface as `None`.

use sqlx::PgPool;

use ridewire_core::ride::RideStatus;
use ridewire_core::types::DbId;

use crate::models::ride::{NewRide, Ride};

/// Column list for `rides` queries.
const COLUMNS: &str = "\
    id, client_id, driver_id, \
    pickup_lat, pickup_lon, pickup_address, \
    dropoff_lat, dropoff_lon, dropoff_address, \
    status, estimated_price, final_price, \
    cancellation_reason, cancelled_by, rating, comment, version, \
    created_at, accepted_at, started_at, completed_at, cancelled_at, updated_at";

/// Maximum page size for ride listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for ride listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides lifecycle operations for rides.
pub struct RideRepo;

impl RideRepo {
    /// Create a new ride in `pending` status.
    pub async fn create(pool: &PgPool, input: &NewRide) -> Result<Ride, sqlx::Error> {
        let query = format!(
            "INSERT INTO rides (client_id, pickup_lat, pickup_lon, pickup_address, \
                                dropoff_lat, dropoff_lon, dropoff_address, estimated_price) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(input.client_id)
            .bind(input.pickup.latitude)
            .bind(input.pickup.longitude)
            .bind(&input.pickup_address)
            .bind(input.dropoff.latitude)
            .bind(input.dropoff.longitude)
            .bind(&input.dropoff_address)
            .bind(input.estimated_price)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, ride_id: DbId) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rides WHERE id = $1");
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim a pending ride for a driver.
    ///
    /// The status + driver_id precondition makes claim resolution
    /// linearizable per ride across service instances: exactly one of N
    /// concurrent claimants gets the row back, the rest get `None`.
    pub async fn claim(
        pool: &PgPool,
        ride_id: DbId,
        driver_id: DbId,
    ) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!(
            "UPDATE rides \
             SET driver_id = $2, status = $3, accepted_at = NOW(), \
                 version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND status = $4 AND driver_id IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(driver_id)
            .bind(RideStatus::Accepted.as_str())
            .bind(RideStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// `accepted -> driverArriving`. The geofence gate runs in the
    /// coordinator before this is called.
    pub async fn mark_driver_arriving(
        pool: &PgPool,
        ride_id: DbId,
        driver_id: DbId,
    ) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!(
            "UPDATE rides \
             SET status = $3, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND driver_id = $2 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(driver_id)
            .bind(RideStatus::DriverArriving.as_str())
            .bind(RideStatus::Accepted.as_str())
            .fetch_optional(pool)
            .await
    }

    /// `driverArriving -> inProgress`. Sets `started_at`.
    pub async fn start_trip(
        pool: &PgPool,
        ride_id: DbId,
        driver_id: DbId,
    ) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!(
            "UPDATE rides \
             SET status = $3, started_at = NOW(), version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND driver_id = $2 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(driver_id)
            .bind(RideStatus::InProgress.as_str())
            .bind(RideStatus::DriverArriving.as_str())
            .fetch_optional(pool)
            .await
    }

    /// `inProgress -> completed`. Sets `completed_at` and the final price
    /// (falling back to the estimate when none is supplied).
    pub async fn complete(
        pool: &PgPool,
        ride_id: DbId,
        driver_id: DbId,
        final_price: Option<f64>,
    ) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!(
            "UPDATE rides \
             SET status = $3, completed_at = NOW(), \
                 final_price = COALESCE($5, estimated_price), \
                 version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND driver_id = $2 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(driver_id)
            .bind(RideStatus::Completed.as_str())
            .bind(RideStatus::InProgress.as_str())
            .bind(final_price)
            .fetch_optional(pool)
            .await
    }

    /// Cancel a ride if its current status is one of `allowed_from`.
    ///
    /// The allowed set depends on the actor (parties may not cancel an
    /// in-progress trip; admins may). A claim racing this cancellation
    /// loses on whichever statement runs second.
    pub async fn cancel(
        pool: &PgPool,
        ride_id: DbId,
        reason: &str,
        cancelled_by: &str,
        allowed_from: &[RideStatus],
    ) -> Result<Option<Ride>, sqlx::Error> {
        let allowed: Vec<String> = allowed_from.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            "UPDATE rides \
             SET status = $2, cancellation_reason = $3, cancelled_by = $4, \
                 cancelled_at = NOW(), version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($5::text[]) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(RideStatus::Cancelled.as_str())
            .bind(reason)
            .bind(cancelled_by)
            .bind(allowed)
            .fetch_optional(pool)
            .await
    }

    /// Attach a post-completion rating. Only the owning client may rate,
    /// only once, and only after completion.
    pub async fn rate(
        pool: &PgPool,
        ride_id: DbId,
        client_id: DbId,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Option<Ride>, sqlx::Error> {
        let query = format!(
            "UPDATE rides \
             SET rating = $3, comment = $4, updated_at = NOW() \
             WHERE id = $1 AND client_id = $2 AND status = $5 AND rating IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(ride_id)
            .bind(client_id)
            .bind(rating)
            .bind(comment)
            .bind(RideStatus::Completed.as_str())
            .fetch_optional(pool)
            .await
    }

    /// List rides where the principal is either party, newest first.
    pub async fn list_for_principal(
        pool: &PgPool,
        principal_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Ride>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        let query = format!(
            "SELECT {COLUMNS} FROM rides \
             WHERE client_id = $1 OR driver_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(principal_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Rides in an active state with an assigned driver. This is the
    /// broadcaster's working set each tick.
    pub async fn find_active_with_driver(
        pool: &PgPool,
    ) -> Result<Vec<(DbId, DbId)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, DbId)>(
            "SELECT id, driver_id FROM rides \
             WHERE driver_id IS NOT NULL AND status = ANY($1::text[])",
        )
        .bind(vec![
            RideStatus::Accepted.as_str().to_string(),
            RideStatus::DriverArriving.as_str().to_string(),
            RideStatus::InProgress.as_str().to_string(),
        ])
        .fetch_all(pool)
        .await
    }
}
