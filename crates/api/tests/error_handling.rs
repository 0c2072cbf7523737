//! Tests for `AppError` -> HTTP response mapping.
//!
//! These tests verify that each error variant produces the correct HTTP
//! status code, error code, and message. They do NOT need an HTTP server --
//! they call `IntoResponse` directly on `AppError` values.

use axum::response::IntoResponse;
use http_body_util::BodyExt;

use ridewire_api::error::AppError;
use ridewire_core::error::CoreError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (axum::http::StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Ride",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Ride with id 42 not found");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("Ride is no longer available".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["error"], "Ride is no longer available");
}

#[tokio::test]
async fn geofence_error_returns_403_with_distances() {
    let err = AppError::Core(CoreError::Geofence {
        distance_m: 5012.0,
        max_allowed_m: 2000.0,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, axum::http::StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "GEOFENCE");
    assert_eq!(json["details"]["distanceM"], 5012.0);
    assert_eq!(json["details"]["maxAllowedM"], 2000.0);
}

#[tokio::test]
async fn stale_state_error_returns_410() {
    let err = AppError::Core(CoreError::StaleState(
        "The offer for this ride has expired".into(),
    ));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, axum::http::StatusCode::GONE);
    assert_eq!(json["code"], "STALE_STATE");
    assert_eq!(json["error"], "The offer for this ride has expired");
}

#[tokio::test]
async fn internal_error_sanitizes_the_message() {
    let err = AppError::InternalError("connection pool exhausted on 10.0.0.3".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    // The wire message must not leak internals.
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn unauthorized_and_forbidden_are_distinct() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Unauthorized("No token".into()))).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, json) =
        error_to_response(AppError::Core(CoreError::Forbidden("Not your ride".into()))).await;
    assert_eq!(status, axum::http::StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}
