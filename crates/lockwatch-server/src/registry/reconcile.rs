//! Identity reconciliation for re-announcing devices.
//!
//! A physical device may come back with a freshly generated transient ID
//! (reinstall, storage wipe) while keeping its human-assigned display name.
//! The display name is the merge key; the most-recently-seen persisted row
//! with that exact name is treated as the canonical identity.
//!
//! Known limitation: two distinct devices sharing a display name are
//! ambiguous. "Most recently seen" is the only tie-breaker; anything
//! smarter is a product decision, not something to quietly bolt on here.

use tracing::{info, warn};

use lockwatch_core::db::unix_timestamp;

use crate::storage::ServerDatabase;

use super::EndpointRegistry;

/// Outcome of resolving a newly-announcing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical device identity to use from here on. May differ from the
    /// announced ID when a name merge occurred.
    pub pc_id: String,
    /// Ownership in effect after the coalesce policy.
    pub owner_id: Option<String>,
}

/// Resolve an announcing device against the persisted registry and merge
/// its in-memory state onto the canonical identity.
///
/// Existing ownership always wins over whatever ownership context the new
/// announce carries; a null claim never clears a stored owner. Store faults
/// are logged and degrade to "no merge" -- the live path must keep working
/// through a storage outage.
pub async fn resolve_identity(
    db: &ServerDatabase,
    registry: &EndpointRegistry,
    new_id: &str,
    display_name: Option<&str>,
    owner_claim: Option<&str>,
    ip: Option<&str>,
) -> Resolution {
    let mut pc_id = new_id.to_string();
    let mut owner_id = owner_claim.map(str::to_string);

    if let Some(name) = display_name.filter(|n| !n.is_empty()) {
        match db.find_device_by_name(name).await {
            Ok(Some(existing)) if existing.id != new_id => {
                info!(
                    new_id = %new_id,
                    canonical = %existing.id,
                    name = %name,
                    "Reconciled re-announced device to existing identity"
                );
                registry.merge_identity(new_id, &existing.id).await;
                pc_id = existing.id;
                // Prior ownership wins over anything the announce carries.
                if existing.owner_id.is_some() {
                    owner_id = existing.owner_id;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(name = %name, error = %e, "Name lookup failed, skipping identity merge");
            }
        }
    }

    let upsert = db
        .upsert_device(
            &pc_id,
            display_name,
            owner_id.as_deref(),
            ip,
            unix_timestamp(),
        )
        .await;
    match upsert {
        Ok(row) => {
            // The coalesce policy may have kept an owner the announce did
            // not know about; reflect the stored truth back to the caller.
            owner_id = row.owner_id;
        }
        Err(e) => {
            warn!(pc_id = %pc_id, error = %e, "Device upsert failed, continuing with in-memory state");
        }
    }

    Resolution { pc_id, owner_id }
}
