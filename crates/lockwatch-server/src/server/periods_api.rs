//! Block-period schedule CRUD.
//!
//! Every successful mutation is followed by a schedule push to the
//! owner's connected devices so endpoints enforce the new schedule
//! without waiting for their next connection.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use lockwatch_proto::BlockPeriodView;

use super::error::{ApiError, ApiResult};
use super::extract::AuthOwner;
use super::schedule;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PeriodRequest {
    /// Daily start, `HH:MM`.
    pub from_time: String,
    /// Daily end, `HH:MM`.
    pub to_time: String,
    /// Weekday tokens; empty means every day.
    #[serde(default)]
    pub days: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PeriodListResponse {
    pub periods: Vec<BlockPeriodView>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

fn validate_time(value: &str) -> ApiResult<()> {
    let valid = value.len() == 5
        && value.as_bytes()[2] == b':'
        && value[..2].parse::<u8>().is_ok_and(|h| h < 24)
        && value[3..].parse::<u8>().is_ok_and(|m| m < 60);
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid time (expected HH:MM): {value}"
        )))
    }
}

fn validate_request(req: &PeriodRequest) -> ApiResult<String> {
    validate_time(&req.from_time)?;
    validate_time(&req.to_time)?;
    for day in &req.days {
        if day.contains(',') {
            return Err(ApiError::BadRequest(format!("Invalid day token: {day}")));
        }
    }
    Ok(req.days.join(","))
}

/// `GET /api/periods`: the caller's schedule.
pub async fn list_periods(
    State(state): State<AppState>,
    owner: AuthOwner,
) -> ApiResult<Json<PeriodListResponse>> {
    let periods = state
        .db
        .list_block_periods(&owner.user_id)
        .await?
        .iter()
        .map(schedule::period_view)
        .collect();
    Ok(Json(PeriodListResponse { periods }))
}

/// `POST /api/periods`: create a block period.
pub async fn create_period(
    State(state): State<AppState>,
    owner: AuthOwner,
    Json(req): Json<PeriodRequest>,
) -> ApiResult<Json<BlockPeriodView>> {
    let days = validate_request(&req)?;
    let id = uuid::Uuid::new_v4().to_string();
    let period = state
        .db
        .create_block_period(&id, &owner.user_id, &req.from_time, &req.to_time, &days)
        .await?;

    info!(owner = %owner.username, period_id = %id, "Block period created");
    schedule::push_schedule(&state, &owner.user_id).await;
    Ok(Json(schedule::period_view(&period)))
}

/// `PUT /api/periods/{id}`: update a block period.
pub async fn update_period(
    State(state): State<AppState>,
    owner: AuthOwner,
    Path(id): Path<String>,
    Json(req): Json<PeriodRequest>,
) -> ApiResult<Json<BlockPeriodView>> {
    let days = validate_request(&req)?;
    let updated = state
        .db
        .update_block_period(&id, &owner.user_id, &req.from_time, &req.to_time, &days)
        .await?;

    if !updated {
        return Err(ApiError::NotFound(format!("Block period {id}")));
    }

    let period = state.db.get_block_period(&id).await?;
    schedule::push_schedule(&state, &owner.user_id).await;
    Ok(Json(schedule::period_view(&period)))
}

/// `DELETE /api/periods/{id}`: delete a block period.
pub async fn delete_period(
    State(state): State<AppState>,
    owner: AuthOwner,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = state.db.delete_block_period(&id, &owner.user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Block period {id}")));
    }

    info!(owner = %owner.username, period_id = %id, "Block period deleted");
    schedule::push_schedule(&state, &owner.user_id).await;
    Ok(Json(DeletedResponse { deleted }))
}
