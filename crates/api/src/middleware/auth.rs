//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use ridewire_core::error::CoreError;
use ridewire_core::roles::{ROLE_ADMIN, ROLE_CLIENT, ROLE_DRIVER};
use ridewire_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated principal extracted from a JWT Bearer token in the
/// `Authorization` header.
///
/// Use this as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.principal_id, role = %user.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The principal's internal database id (from `claims.sub`).
    pub principal_id: DbId,
    /// The principal's role name (`"client"`, `"driver"`, `"admin"`).
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Require the driver role, admins excluded -- drivers act on their
    /// own presence and rides only.
    pub fn require_driver(&self) -> Result<(), AppError> {
        if self.role == ROLE_DRIVER {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(
                "Driver role required".into(),
            )))
        }
    }

    /// Require the client role.
    pub fn require_client(&self) -> Result<(), AppError> {
        if self.role == ROLE_CLIENT {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(
                "Client role required".into(),
            )))
        }
    }

    /// Require the admin role.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            principal_id: claims.sub,
            role: claims.role,
        })
    }
}
