//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;
use super::state::AppState;

/// Authenticated owner extracted from a Bearer token in the
/// `Authorization` header. Use as a handler parameter wherever a request
/// must be tied to an owner.
#[derive(Debug, Clone)]
pub struct AuthOwner {
    /// The owner's user ID (from `claims.sub`).
    pub user_id: String,
    pub username: String,
}

impl FromRequestParts<AppState> for AuthOwner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = state
            .jwt
            .validate(token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

        if !claims.is_access() {
            return Err(ApiError::Unauthorized("Not an access token".into()));
        }

        Ok(Self {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}
