//! Device listing, probing, and command endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use lockwatch_proto::{CommandAction, DeviceView, LockStatus, ServerEvent};

use super::error::{ApiError, ApiResult};
use super::extract::AuthOwner;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceView>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub pc_id: String,
    pub status: LockStatus,
    pub last_status_at: Option<i64>,
    /// True when a live device answered the probe.
    pub probed: bool,
    /// True when the value came from the persisted fallback rather than
    /// a live answer.
    pub stale: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub action: CommandAction,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub pc_id: String,
    pub delivered: bool,
}

/// Reject requests for devices the caller does not own. Unknown devices
/// and foreign devices both come back as 404 to avoid leaking existence.
async fn owned_device(state: &AppState, owner: &AuthOwner, pc_id: &str) -> ApiResult<()> {
    let row = state
        .db
        .get_device(pc_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("Device {pc_id}")))?;

    if row.owner_id.as_deref() != Some(owner.user_id.as_str()) {
        return Err(ApiError::NotFound(format!("Device {pc_id}")));
    }
    Ok(())
}

/// `GET /api/devices`: merged view of the caller's devices.
pub async fn list_devices(
    State(state): State<AppState>,
    owner: AuthOwner,
) -> ApiResult<Json<DeviceListResponse>> {
    let devices = state.broadcaster.owner_view(&owner.user_id).await?;
    Ok(Json(DeviceListResponse { devices }))
}

/// `POST /api/devices/{id}/probe`: on-demand status probe.
pub async fn probe_device(
    State(state): State<AppState>,
    owner: AuthOwner,
    Path(pc_id): Path<String>,
) -> ApiResult<Json<ProbeResponse>> {
    owned_device(&state, &owner, &pc_id).await?;

    let outcome = state.prober.probe(&pc_id).await?;
    Ok(Json(ProbeResponse {
        pc_id,
        status: outcome.status,
        last_status_at: outcome.last_status_at,
        probed: outcome.probed,
        stale: outcome.stale,
    }))
}

/// `POST /api/devices/{id}/command`: fire-and-forget command relay.
/// Delivery means "handed to the live link", not "executed".
pub async fn command_device(
    State(state): State<AppState>,
    owner: AuthOwner,
    Path(pc_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let action = req.action;

    owned_device(&state, &owner, &pc_id).await?;

    let link = state
        .registry
        .link(&pc_id)
        .await
        .ok_or_else(|| ApiError::Probe(crate::probe::ProbeError::Offline(pc_id.clone())))?;

    if link.send(ServerEvent::Command { action }).await.is_err() {
        return Err(ApiError::Probe(crate::probe::ProbeError::Offline(pc_id)));
    }

    info!(pc_id = %pc_id, ?action, owner = %owner.username, "Command relayed");
    Ok(Json(CommandResponse {
        pc_id,
        delivered: true,
    }))
}
