//! Handlers for the `/location` resource (driver presence).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_db::models::presence::LocationReport;
use ridewire_db::repositories::PresenceRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub speed_kmh: f64,
}

/// POST /api/v1/location
///
/// Driver position report. Creates the presence record on first contact
/// and resets the freshness clock on every call; the broadcaster picks
/// the position up on its next tick.
pub async fn report_location(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ReportLocationRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_driver()?;
    input.validate()?;

    let position = GeoPoint::new(input.latitude, input.longitude);
    position.validate().map_err(AppError::Core)?;

    let presence = PresenceRepo::report(
        &state.pool,
        auth.principal_id,
        &LocationReport {
            position,
            heading: input.heading,
            speed_kmh: input.speed_kmh,
        },
    )
    .await?;

    Ok(Json(DataResponse { data: presence }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub online: bool,
}

/// PUT /api/v1/location/status
///
/// Toggle driver availability. Going offline is refused while a ride is
/// attached.
pub async fn set_availability(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<AvailabilityRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_driver()?;

    let updated =
        PresenceRepo::set_availability(&state.pool, auth.principal_id, input.online).await?;

    match updated {
        Some(presence) => Ok(Json(DataResponse { data: presence })),
        None => {
            // Guard failed: either no presence row yet, or mid-ride.
            let existing = PresenceRepo::get(&state.pool, auth.principal_id).await?;
            match existing {
                None => Err(AppError::Core(CoreError::NotFound {
                    entity: "Driver presence",
                    id: auth.principal_id,
                })),
                Some(_) => Err(AppError::Core(CoreError::Conflict(
                    "Cannot change availability during an active ride".into(),
                ))),
            }
        }
    }
}
