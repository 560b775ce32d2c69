//! Schedule pushes to connected endpoints.

use tracing::{debug, warn};

use lockwatch_proto::{BlockPeriodView, ServerEvent};

use crate::storage::BlockPeriod;

use super::state::AppState;

pub fn period_view(period: &BlockPeriod) -> BlockPeriodView {
    BlockPeriodView {
        id: period.id.clone(),
        from_time: period.from_time.clone(),
        to_time: period.to_time.clone(),
        days: period.day_tokens(),
    }
}

/// Push the owner's current block-period schedule to every connected
/// device they own. An empty schedule is never pushed: endpoints keep
/// their last known schedule until a non-empty replacement arrives.
pub async fn push_schedule(state: &AppState, owner_id: &str) {
    let periods = match state.db.list_block_periods(owner_id).await {
        Ok(periods) => periods,
        Err(e) => {
            warn!(owner_id = %owner_id, error = %e, "Schedule read failed, push skipped");
            return;
        }
    };

    if periods.is_empty() {
        debug!(owner_id = %owner_id, "Empty schedule, push suppressed");
        return;
    }

    let views: Vec<BlockPeriodView> = periods.iter().map(period_view).collect();

    let devices = match state.db.list_devices_by_owner(owner_id).await {
        Ok(devices) => devices,
        Err(e) => {
            warn!(owner_id = %owner_id, error = %e, "Device list read failed, push skipped");
            return;
        }
    };

    for device in &devices {
        if let Some(link) = state.registry.link(&device.id).await {
            let event = ServerEvent::ScheduleUpdate {
                periods: views.clone(),
            };
            if link.send(event).await.is_err() {
                debug!(pc_id = %device.id, "Schedule push failed, link closing");
            }
        }
    }
}
