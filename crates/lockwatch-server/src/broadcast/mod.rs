//! Per-owner status broadcasting to observer sessions.
//!
//! Every status change triggers a full re-broadcast of each affected
//! owner's device list -- correctness over efficiency; coalescing belongs
//! to a collaborator, not here.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use lockwatch_proto::{DeviceView, LockStatus, ServerEvent};

use crate::registry::{EndpointRegistry, LiveState};
use crate::storage::{Device, ServerDatabase};

/// A live observer session. Unauthenticated sessions have no owner and
/// sit in the discard group: they are tracked but never receive broadcasts.
struct ObserverSession {
    owner_id: Option<String>,
    sender: mpsc::Sender<ServerEvent>,
}

/// Registry of observer sessions, grouped by owner for broadcast.
pub struct ObserverRegistry {
    sessions: RwLock<HashMap<String, ObserverSession>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Track a new session. It starts unauthenticated (discard group).
    pub async fn add(&self, conn_id: String, sender: mpsc::Sender<ServerEvent>) {
        self.sessions.write().await.insert(
            conn_id,
            ObserverSession {
                owner_id: None,
                sender,
            },
        );
    }

    /// Bind a session to an owner after a successful subscribe.
    pub async fn authenticate(&self, conn_id: &str, owner_id: String) {
        if let Some(session) = self.sessions.write().await.get_mut(conn_id) {
            session.owner_id = Some(owner_id);
        }
    }

    /// Drop a session on transport loss.
    pub async fn remove(&self, conn_id: &str) {
        self.sessions.write().await.remove(conn_id);
    }

    /// Send an event to every session bound to `owner_id`. Closed channels
    /// are skipped; their sessions are cleaned up by their receive loops.
    pub async fn send_to_owner(&self, owner_id: &str, event: &ServerEvent) -> usize {
        let sessions = self.sessions.read().await;
        let mut count = 0;
        for session in sessions.values() {
            if session.owner_id.as_deref() == Some(owner_id)
                && session.sender.try_send(event.clone()).is_ok()
            {
                count += 1;
            }
        }
        count
    }

    /// Number of tracked sessions (authenticated or not).
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the merged view for one persisted row: live truth wins,
/// persisted truth is next-best, `Unknown` is the absolute floor. A device
/// is never omitted because its status is unresolved.
pub fn merged_view(row: &Device, live: Option<LiveState>) -> DeviceView {
    let live_status = live.and_then(|l| l.status);
    DeviceView {
        pc_id: row.id.clone(),
        name: row.name.clone(),
        status: live_status.unwrap_or_else(|| LockStatus::from_db(&row.last_status)),
        connected: live.is_some_and(|l| l.connected),
        last_status_at: live.and_then(|l| l.last_status_at).or(row.last_status_at),
        last_seen: row.last_seen,
        ip: row.ip.clone(),
    }
}

/// Pushes merged device lists to each owner's observer sessions.
pub struct Broadcaster {
    db: ServerDatabase,
    registry: Arc<EndpointRegistry>,
    observers: Arc<ObserverRegistry>,
}

impl Broadcaster {
    pub fn new(
        db: ServerDatabase,
        registry: Arc<EndpointRegistry>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            db,
            registry,
            observers,
        }
    }

    /// Merged view of one owner's devices, for snapshots and the HTTP API.
    pub async fn owner_view(&self, owner_id: &str) -> Result<Vec<DeviceView>, crate::storage::DatabaseError> {
        let rows = self.db.list_devices_by_owner(owner_id).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            views.push(merged_view(row, self.registry.live(&row.id).await));
        }
        Ok(views)
    }

    /// Full re-broadcast: group every owned device by owner and push each
    /// owner's list to their sessions. Unowned devices are never broadcast.
    /// A store fault is logged and skips this round; the next status change
    /// re-broadcasts anyway.
    pub async fn broadcast_all(&self) {
        let rows = match self.db.list_all_devices().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Device list read failed, skipping broadcast");
                return;
            }
        };

        let mut by_owner: HashMap<String, Vec<DeviceView>> = HashMap::new();
        for row in &rows {
            let Some(owner_id) = row.owner_id.clone() else {
                continue;
            };
            let view = merged_view(row, self.registry.live(&row.id).await);
            by_owner.entry(owner_id).or_default().push(view);
        }

        for (owner_id, devices) in by_owner {
            let sent = self
                .observers
                .send_to_owner(&owner_id, &ServerEvent::DeviceListUpdate { devices })
                .await;
            debug!(owner_id = %owner_id, sessions = sent, "Device list pushed");
        }
    }

    /// Send one immediate snapshot to a freshly subscribed session's owner
    /// group (the subscriber is already in it).
    pub async fn send_snapshot(&self, owner_id: &str) {
        match self.owner_view(owner_id).await {
            Ok(devices) => {
                self.observers
                    .send_to_owner(owner_id, &ServerEvent::DeviceListUpdate { devices })
                    .await;
            }
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "Snapshot read failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::registry::DeviceLink;

    async fn test_db() -> ServerDatabase {
        ServerDatabase::open_in_memory().await.unwrap()
    }

    fn device_link(conn_id: &str) -> Arc<DeviceLink> {
        let (tx, _rx) = mpsc::channel(16);
        Arc::new(DeviceLink::new(conn_id.into(), tx))
    }

    async fn observer(
        observers: &ObserverRegistry,
        conn_id: &str,
        owner_id: Option<&str>,
    ) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(16);
        observers.add(conn_id.to_string(), tx).await;
        if let Some(owner) = owner_id {
            observers.authenticate(conn_id, owner.to_string()).await;
        }
        rx
    }

    #[tokio::test]
    async fn broadcast_excludes_unowned_devices() {
        let db = test_db().await;
        db.create_user("u1", "alice", "a@example.com", "h")
            .await
            .unwrap();
        db.upsert_device("pc1", Some("A"), Some("u1"), None, 1)
            .await
            .unwrap();
        db.upsert_device("stray", Some("B"), None, None, 2).await.unwrap();

        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster = Broadcaster::new(db, Arc::clone(&registry), Arc::clone(&observers));

        let mut rx = observer(&observers, "o1", Some("u1")).await;
        broadcaster.broadcast_all().await;

        let ServerEvent::DeviceListUpdate { devices } = rx.recv().await.unwrap() else {
            panic!("expected device list");
        };
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].pc_id, "pc1");
    }

    #[tokio::test]
    async fn unauthenticated_sessions_receive_nothing() {
        let db = test_db().await;
        db.create_user("u1", "alice", "a@example.com", "h")
            .await
            .unwrap();
        db.upsert_device("pc1", Some("A"), Some("u1"), None, 1)
            .await
            .unwrap();

        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster = Broadcaster::new(db, Arc::clone(&registry), Arc::clone(&observers));

        let mut rx = observer(&observers, "o1", None).await;
        broadcaster.broadcast_all().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn merged_view_layers_live_over_persisted() {
        let db = test_db().await;
        db.create_user("u1", "alice", "a@example.com", "h")
            .await
            .unwrap();
        db.upsert_device("pc1", Some("A"), Some("u1"), None, 1)
            .await
            .unwrap();
        db.upsert_device_status("pc1", "locked", 100).await.unwrap();

        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster =
            Broadcaster::new(db.clone(), Arc::clone(&registry), Arc::clone(&observers));

        // No live state: persisted fallback
        let views = broadcaster.owner_view("u1").await.unwrap();
        assert_eq!(views[0].status, LockStatus::Locked);
        assert!(!views[0].connected);

        // Live report wins
        let l = device_link("c1");
        registry
            .report_status(Some("pc1"), &l, LockStatus::Unlocked)
            .await
            .unwrap();
        let views = broadcaster.owner_view("u1").await.unwrap();
        assert_eq!(views[0].status, LockStatus::Unlocked);
        assert!(views[0].connected);

        // Disconnect flips connected, keeps last reported status
        registry.disconnect("c1").await;
        let views = broadcaster.owner_view("u1").await.unwrap();
        assert_eq!(views[0].status, LockStatus::Unlocked);
        assert!(!views[0].connected);
    }

    #[tokio::test]
    async fn unresolved_status_floors_to_unknown() {
        let db = test_db().await;
        db.create_user("u1", "alice", "a@example.com", "h")
            .await
            .unwrap();
        db.upsert_device("pc1", Some("A"), Some("u1"), None, 1)
            .await
            .unwrap();

        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster = Broadcaster::new(db, Arc::clone(&registry), Arc::clone(&observers));

        let views = broadcaster.owner_view("u1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, LockStatus::Unknown);
    }

    #[tokio::test]
    async fn reconnect_under_new_id_broadcasts_single_merged_entry() {
        let db = test_db().await;
        db.create_user("u1", "alice", "a@example.com", "h")
            .await
            .unwrap();

        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster =
            Broadcaster::new(db.clone(), Arc::clone(&registry), Arc::clone(&observers));

        // First life: tmp1 announces, reports Locked
        crate::registry::reconcile::resolve_identity(
            &db,
            &registry,
            "tmp1",
            Some("Lab-PC"),
            Some("u1"),
            None,
        )
        .await;
        let l1 = device_link("c1");
        registry.attach("tmp1", Arc::clone(&l1), None).await;
        registry
            .report_status(Some("tmp1"), &l1, LockStatus::Locked)
            .await
            .unwrap();

        let mut rx = observer(&observers, "o1", Some("u1")).await;
        broadcaster.broadcast_all().await;
        let ServerEvent::DeviceListUpdate { devices } = rx.recv().await.unwrap() else {
            panic!("expected device list");
        };
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].pc_id, "tmp1");
        assert_eq!(devices[0].status, LockStatus::Locked);
        assert!(devices[0].connected);

        // Restart: reconnects as tmp2 with the same name
        registry.disconnect("c1").await;
        let l2 = device_link("c2");
        registry.attach("tmp2", Arc::clone(&l2), None).await;
        let res = crate::registry::reconcile::resolve_identity(
            &db,
            &registry,
            "tmp2",
            Some("Lab-PC"),
            None,
            None,
        )
        .await;
        assert_eq!(res.pc_id, "tmp1");

        broadcaster.broadcast_all().await;
        let ServerEvent::DeviceListUpdate { devices } = rx.recv().await.unwrap() else {
            panic!("expected device list");
        };
        assert_eq!(devices.len(), 1, "merged, not duplicated");
        assert_eq!(devices[0].pc_id, "tmp1");
        assert!(devices[0].connected);
    }
}
