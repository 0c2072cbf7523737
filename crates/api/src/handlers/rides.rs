//! Handlers for the `/rides` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Request bodies
//! use camelCase field names to match the mobile apps.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_core::ride::{CancelActor, RideStatus};
use ridewire_core::roles::{ROLE_CLIENT, ROLE_DRIVER};
use ridewire_core::types::DbId;
use ridewire_db::models::ride::{NewRide, Ride};
use ridewire_db::repositories::RideRepo;

use crate::dispatch::Coordinator;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a ride and verify the caller is a party to it (or an admin).
async fn find_and_authorize(
    pool: &sqlx::PgPool,
    ride_id: DbId,
    auth: &AuthUser,
) -> AppResult<Ride> {
    let ride = RideRepo::find_by_id(pool, ride_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Ride",
            id: ride_id,
        }))?;

    let is_party = ride.client_id == auth.principal_id || ride.driver_id == Some(auth.principal_id);
    if !is_party && !auth.is_admin() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Not a party to this ride".into(),
        )));
    }

    Ok(ride)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    pub pickup_location: GeoPoint,
    pub pickup_address: Option<String>,
    pub dropoff_location: GeoPoint,
    pub dropoff_address: Option<String>,
    /// Computed by the pricing collaborator before intake.
    pub estimated_price: f64,
}

/// POST /api/v1/rides
///
/// Create a ride in `pending` status and start the offer rounds. Returns
/// 201 with the created ride; matching progress arrives on the ride room.
pub async fn create_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateRideRequest>,
) -> AppResult<impl IntoResponse> {
    if auth.role != ROLE_CLIENT {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only clients can request rides".into(),
        )));
    }

    input.pickup_location.validate().map_err(AppError::Core)?;
    input.dropoff_location.validate().map_err(AppError::Core)?;
    if !input.estimated_price.is_finite() || input.estimated_price < 0.0 {
        return Err(AppError::Core(CoreError::Validation(
            "estimatedPrice must be a non-negative number".into(),
        )));
    }

    let ride = RideRepo::create(
        &state.pool,
        &NewRide {
            client_id: auth.principal_id,
            pickup: input.pickup_location,
            pickup_address: input.pickup_address,
            dropoff: input.dropoff_location,
            dropoff_address: input.dropoff_address,
            estimated_price: input.estimated_price,
        },
    )
    .await?;

    tracing::info!(ride_id = ride.id, client_id = auth.principal_id, "Ride created");

    state.event_bus.publish(
        ridewire_events::RideEvent::new("ride.requested")
            .with_ride(ride.id)
            .with_client(ride.client_id),
    );
    Coordinator::start_offer(&state.coordinator, ride.clone());

    Ok((StatusCode::CREATED, Json(DataResponse { data: ride })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RideListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/rides
///
/// List the caller's rides (as client or driver), newest first.
pub async fn list_rides(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RideListQuery>,
) -> AppResult<impl IntoResponse> {
    let rides =
        RideRepo::list_for_principal(&state.pool, auth.principal_id, query.limit, query.offset)
            .await?;
    Ok(Json(DataResponse { data: rides }))
}

/// GET /api/v1/rides/{id}
pub async fn get_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let ride = find_and_authorize(&state.pool, ride_id, &auth).await?;
    Ok(Json(DataResponse { data: ride }))
}

// ---------------------------------------------------------------------------
// Accept / refuse
// ---------------------------------------------------------------------------

/// POST /api/v1/rides/{id}/accept
///
/// Driver claim. Exactly one of N concurrent accepts succeeds; the rest
/// receive a 409/410 with a typed code so client UIs can re-enter search
/// state immediately.
pub async fn accept_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    auth.require_driver()?;
    let ride = state.coordinator.claim_ride(ride_id, auth.principal_id).await?;
    Ok(Json(DataResponse { data: ride }))
}

/// POST /api/v1/rides/{id}/refuse
///
/// Withdraw from the current offer round only; the ride stays `pending`
/// and other candidates keep their offers.
pub async fn refuse_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    auth.require_driver()?;
    state.coordinator.refuse_ride(ride_id, auth.principal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub status: RideStatus,
    /// The driver's position at the moment of the request; feeds the
    /// pickup-proximity gate.
    pub location: GeoPoint,
    pub final_price: Option<f64>,
}

/// POST /api/v1/rides/{id}/progress
///
/// Driver lifecycle transition (`driverArriving`, `inProgress`,
/// `completed`). Arrival and trip start are geofenced against the pickup
/// point. Repeats are idempotent no-op successes.
pub async fn update_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
    Json(input): Json<ProgressRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_driver()?;
    let outcome = state
        .coordinator
        .update_progress(
            ride_id,
            auth.principal_id,
            input.status,
            input.location,
            input.final_price,
        )
        .await?;
    Ok(Json(DataResponse { data: outcome.ride }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[validate(length(min = 1, message = "a cancellation reason is required"))]
    pub reason: String,
    /// Required when a driver cancels a claimed ride (proximity gate).
    pub driver_location: Option<GeoPoint>,
}

/// POST /api/v1/rides/{id}/cancel
///
/// Either party before the trip starts, or an admin from any non-terminal
/// state. Cancelling an already-cancelled ride is a no-op success.
pub async fn cancel_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
    Json(input): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let actor = match auth.role.as_str() {
        ROLE_CLIENT => CancelActor::Client,
        ROLE_DRIVER => CancelActor::Driver,
        _ if auth.is_admin() => CancelActor::Admin,
        other => {
            return Err(AppError::Core(CoreError::Forbidden(format!(
                "Role '{other}' cannot cancel rides"
            ))));
        }
    };

    let outcome = state
        .coordinator
        .cancel_ride(
            ride_id,
            actor,
            auth.principal_id,
            &input.reason,
            input.driver_location,
        )
        .await?;
    Ok(Json(DataResponse { data: outcome.ride }))
}

// ---------------------------------------------------------------------------
// Manual assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub driver_id: DbId,
}

/// POST /api/v1/rides/{id}/assign
///
/// Admin override: skip the broadcast round but keep the atomic claim
/// path, so the one-driver-per-ride invariant holds. Rejected when the
/// target driver is not available.
pub async fn assign_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
    Json(input): Json<AssignRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_admin()?;
    let ride = state
        .coordinator
        .manual_assign(ride_id, input.driver_id)
        .await?;
    tracing::info!(ride_id, driver_id = input.driver_id, admin_id = auth.principal_id, "Ride manually assigned");
    Ok(Json(DataResponse { data: ride }))
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i16,
    pub comment: Option<String>,
}

/// POST /api/v1/rides/{id}/rating
///
/// Post-completion rating by the owning client, once.
pub async fn rate_ride(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(ride_id): Path<DbId>,
    Json(input): Json<RateRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_client()?;
    input.validate()?;

    let rated = RideRepo::rate(
        &state.pool,
        ride_id,
        auth.principal_id,
        input.rating,
        input.comment.as_deref(),
    )
    .await?;

    match rated {
        Some(ride) => Ok(Json(DataResponse { data: ride })),
        // The guarded update matched nothing; classify for the caller.
        None => {
            let ride = RideRepo::find_by_id(&state.pool, ride_id)
                .await?
                .ok_or(AppError::Core(CoreError::NotFound {
                    entity: "Ride",
                    id: ride_id,
                }))?;
            if ride.client_id != auth.principal_id {
                Err(AppError::Core(CoreError::Forbidden("Not your ride".into())))
            } else if ride.rating.is_some() {
                Err(AppError::Core(CoreError::Conflict(
                    "Ride is already rated".into(),
                )))
            } else {
                Err(AppError::Core(CoreError::Conflict(
                    "Only completed rides can be rated".into(),
                )))
            }
        }
    }
}
