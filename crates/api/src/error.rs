use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ridewire_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `ridewire-core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Core(CoreError::Validation(errors.to_string()))
    }
}

/// Stable machine-readable code for a domain error, shared by the HTTP
/// error body and the WebSocket `error` event.
pub fn error_code(err: &CoreError) -> &'static str {
    match err {
        CoreError::NotFound { .. } => "NOT_FOUND",
        CoreError::Validation(_) => "VALIDATION_ERROR",
        CoreError::Conflict(_) => "CONFLICT",
        CoreError::Unauthorized(_) => "UNAUTHORIZED",
        CoreError::Forbidden(_) => "FORBIDDEN",
        CoreError::Geofence { .. } => "GEOFENCE",
        CoreError::StaleState(_) => "STALE_STATE",
        CoreError::Internal(_) => "INTERNAL_ERROR",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => {
                let code = error_code(core);
                match core {
                    CoreError::NotFound { entity, id } => (
                        StatusCode::NOT_FOUND,
                        code,
                        format!("{entity} with id {id} not found"),
                        None,
                    ),
                    CoreError::Validation(msg) => {
                        (StatusCode::BAD_REQUEST, code, msg.clone(), None)
                    }
                    CoreError::Conflict(msg) => (StatusCode::CONFLICT, code, msg.clone(), None),
                    CoreError::Unauthorized(msg) => {
                        (StatusCode::UNAUTHORIZED, code, msg.clone(), None)
                    }
                    CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, code, msg.clone(), None),
                    CoreError::Geofence {
                        distance_m,
                        max_allowed_m,
                    } => (
                        StatusCode::FORBIDDEN,
                        code,
                        core.to_string(),
                        Some(json!({
                            "distanceM": distance_m.round(),
                            "maxAllowedM": max_allowed_m,
                        })),
                    ),
                    CoreError::StaleState(msg) => (StatusCode::GONE, code, msg.clone(), None),
                    CoreError::Internal(msg) => {
                        tracing::error!(error = %msg, "Internal core error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            code,
                            "An internal error occurred".to_string(),
                            None,
                        )
                    }
                }
            }

            // --- Database errors ---
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}
