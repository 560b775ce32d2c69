//! Owner account and session endpoints.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{self, JwtManager};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

async fn issue_session(state: &AppState, user_id: &str, username: &str) -> ApiResult<SessionResponse> {
    let (access_token, expires_in) = state
        .jwt
        .issue_access_token(user_id, username)
        .map_err(|e| ApiError::Internal(format!("Token creation failed: {e}")))?;

    let (refresh_token, refresh_exp) = state
        .jwt
        .issue_refresh_token(user_id, username)
        .map_err(|e| ApiError::Internal(format!("Token creation failed: {e}")))?;

    let token_id = uuid::Uuid::new_v4().to_string();
    let token_hash = JwtManager::hash_token(&refresh_token);
    state
        .db
        .create_token(&token_id, user_id, &token_hash, refresh_exp)
        .await?;

    Ok(SessionResponse {
        user_id: user_id.to_string(),
        access_token,
        refresh_token,
        expires_in_secs: expires_in,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<SessionResponse>> {
    if req.username.len() < 3 {
        return Err(ApiError::BadRequest(
            "Username must be at least 3 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    if state.db.get_user_by_username(&req.username).await.is_ok() {
        return Err(ApiError::BadRequest("Username already taken".into()));
    }

    let hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {e}")))?;

    let user_id = uuid::Uuid::new_v4().to_string();
    state
        .db
        .create_user(&user_id, &req.username, &req.email, &hash)
        .await?;

    info!(user_id = %user_id, username = %req.username, "User registered");

    let session = issue_session(&state, &user_id, &req.username).await?;
    Ok(Json(session))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let user = state
        .db
        .get_user_by_username(&req.username)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid credentials".into()))?;

    let valid = auth::verify_password(&req.password, &user.password_hash)
        .map_err(|_| ApiError::Internal("Password verification failed".into()))?;

    if !valid {
        warn!(username = %req.username, "Failed login attempt");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = %user.id, username = %user.username, "User logged in");

    let session = issue_session(&state, &user.id, &user.username).await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let claims = state
        .jwt
        .validate(&req.refresh_token)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token".into()))?;

    if !claims.is_refresh() {
        return Err(ApiError::BadRequest("Not a refresh token".into()));
    }

    let token_hash = JwtManager::hash_token(&req.refresh_token);
    let stored = state
        .db
        .get_token_by_hash(&token_hash)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Refresh token revoked or expired".into()))?;

    // Rotation: the old refresh token dies with this exchange
    state.db.revoke_token(&stored.id).await?;

    let session = issue_session(&state, &claims.sub, &claims.username).await?;
    Ok(Json(session))
}

pub async fn revoke(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RevokeResponse>> {
    let token_hash = JwtManager::hash_token(&req.refresh_token);
    let stored = state.db.get_token_by_hash(&token_hash).await?;

    let revoked = if let Some(token) = stored {
        state.db.revoke_token(&token.id).await?
    } else {
        false
    };

    Ok(Json(RevokeResponse { revoked }))
}
