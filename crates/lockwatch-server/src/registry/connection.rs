//! Connection-state registry keyed by device identity.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use lockwatch_core::db::unix_timestamp;
use lockwatch_proto::{LockStatus, ServerEvent};

/// Holds the live transport side of a connected endpoint.
///
/// Outbound events go through `sender`; probe waiters are parked in
/// `pending` keyed by probe token until a reply (explicit or implicit)
/// or a timeout resolves them.
pub struct DeviceLink {
    /// Transport connection ID this link belongs to.
    pub conn_id: String,
    sender: mpsc::Sender<ServerEvent>,
    pending: RwLock<HashMap<String, oneshot::Sender<LockStatus>>>,
}

impl DeviceLink {
    pub fn new(conn_id: String, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            conn_id,
            sender,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Push an event to the device through the live transport.
    pub async fn send(
        &self,
        event: ServerEvent,
    ) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event).await
    }

    /// Register a probe waiter and return a receiver for the answer.
    pub async fn register_pending(&self, probe_token: String) -> oneshot::Receiver<LockStatus> {
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(probe_token, tx);
        rx
    }

    /// Complete one probe waiter with an explicit reply.
    pub async fn complete_pending(&self, probe_token: &str, status: LockStatus) -> bool {
        if let Some(tx) = self.pending.write().await.remove(probe_token) {
            tx.send(status).is_ok()
        } else {
            false
        }
    }

    /// Complete every parked probe waiter. An ordinary status report from
    /// the device counts as an implicit reply to all outstanding probes.
    pub async fn complete_all_pending(&self, status: LockStatus) -> usize {
        let mut pending = self.pending.write().await;
        let count = pending.len();
        for (_, tx) in pending.drain() {
            let _ = tx.send(status);
        }
        count
    }

    /// Detach one probe waiter without completing it (probe timed out).
    pub async fn cancel_pending(&self, probe_token: &str) {
        self.pending.write().await.remove(probe_token);
    }

    /// Drop all probe waiters (transport lost).
    pub async fn cancel_all_pending(&self) {
        self.pending.write().await.clear();
    }
}

/// Per-device in-memory state. `link` is present iff the device is
/// currently connected; status fields survive disconnects.
#[derive(Default)]
struct EndpointEntry {
    link: Option<Arc<DeviceLink>>,
    status: Option<LockStatus>,
    last_status_at: Option<i64>,
}

/// Snapshot of one device's live state, for merged-view readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveState {
    pub connected: bool,
    pub status: Option<LockStatus>,
    pub last_status_at: Option<i64>,
}

/// A committed status update, published for the out-of-band persistence
/// worker and any other consumer of status-change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub pc_id: String,
    pub status: LockStatus,
    pub at: i64,
}

/// Thread-safe registry of endpoint connection state.
///
/// All mutation happens under the inner locks and never awaits I/O;
/// persistence and broadcast are the caller's concern, dispatched after
/// the in-memory mutation commits.
pub struct EndpointRegistry {
    entries: RwLock<HashMap<String, EndpointEntry>>,
    /// Reverse lookup: transport connection ID to device identity.
    by_conn: RwLock<HashMap<String, String>>,
    status_events: broadcast::Sender<StatusChange>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        let (status_events, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(HashMap::new()),
            by_conn: RwLock::new(HashMap::new()),
            status_events,
        }
    }

    /// Subscribe to committed status changes. Lagging receivers miss
    /// events; the feed is an at-most-once mirror, not a durable queue.
    pub fn subscribe_status_events(&self) -> broadcast::Receiver<StatusChange> {
        self.status_events.subscribe()
    }

    /// Merge an announcing connection into the entry for `pc_id`.
    ///
    /// Does not clobber a status that raced ahead of the announce. When the
    /// entry has no status yet, `hydrate` (the persisted last status, if
    /// any) seeds it; on a miss the status stays unset so downstream
    /// fallback can tell "never reported" from "explicitly unknown".
    pub async fn attach(
        &self,
        pc_id: &str,
        link: Arc<DeviceLink>,
        hydrate: Option<(LockStatus, Option<i64>)>,
    ) {
        let conn_id = link.conn_id.clone();
        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(pc_id.to_string()).or_default();
            entry.link = Some(link);
            if entry.status.is_none()
                && let Some((status, at)) = hydrate
            {
                entry.status = Some(status);
                entry.last_status_at = at;
            }
        }
        self.tag_connection(&conn_id, pc_id).await;
        info!(pc_id = %pc_id, "Endpoint attached");
    }

    /// Point the reverse lookup for `conn_id` at `pc_id`. A transport has
    /// exactly one identity: when it previously mapped to a different one,
    /// that entry's link is released (implicit disconnect of the old
    /// identity) so it cannot report connected on a dead transport.
    async fn tag_connection(&self, conn_id: &str, pc_id: &str) {
        let prev = self
            .by_conn
            .write()
            .await
            .insert(conn_id.to_string(), pc_id.to_string());

        let Some(prev) = prev.filter(|p| p != pc_id) else {
            return;
        };
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&prev)
            && entry
                .link
                .as_ref()
                .is_some_and(|link| link.conn_id == conn_id)
        {
            entry.link = None;
            debug!(from = %prev, to = %pc_id, "Transport re-tagged, previous identity released");
        }
    }

    /// Apply a status report.
    ///
    /// The effective identity is the claimed `pc_id` when present, else the
    /// identity already associated with the reporting connection. A report
    /// with no resolvable identity is dropped (logged, not an error the
    /// caller can observe).
    pub async fn report_status(
        &self,
        claimed: Option<&str>,
        link: &Arc<DeviceLink>,
        status: LockStatus,
    ) -> Option<StatusChange> {
        let pc_id = match claimed {
            Some(id) => id.to_string(),
            None => match self.by_conn.read().await.get(&link.conn_id) {
                Some(id) => id.clone(),
                None => {
                    warn!(conn_id = %link.conn_id, "Status report with no resolvable identity, dropping");
                    return None;
                }
            },
        };

        let at = unix_timestamp();
        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(pc_id.clone()).or_default();
            entry.status = Some(status);
            entry.last_status_at = Some(at);
            entry.link = Some(Arc::clone(link));
        }
        self.tag_connection(&link.conn_id, &pc_id).await;

        debug!(pc_id = %pc_id, status = %status, "Status recorded");

        let change = StatusChange { pc_id, status, at };
        let _ = self.status_events.send(change.clone());
        Some(change)
    }

    /// Handle transport loss. Returns the device identity that was attached
    /// to this connection, if any; unregistered connections are a no-op.
    pub async fn disconnect(&self, conn_id: &str) -> Option<String> {
        let pc_id = self.by_conn.write().await.remove(conn_id)?;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&pc_id) {
            // A fast reconnect may already have installed a newer link;
            // only clear the one that actually went away.
            if entry
                .link
                .as_ref()
                .is_some_and(|link| link.conn_id == conn_id)
            {
                entry.link = None;
                info!(pc_id = %pc_id, "Endpoint disconnected");
            }
        }
        Some(pc_id)
    }

    /// Get the live transport link for a device, if connected.
    pub async fn link(&self, pc_id: &str) -> Option<Arc<DeviceLink>> {
        self.entries
            .read()
            .await
            .get(pc_id)
            .and_then(|e| e.link.clone())
    }

    /// Snapshot a device's live state. `None` means the registry has never
    /// seen this identity.
    pub async fn live(&self, pc_id: &str) -> Option<LiveState> {
        self.entries.read().await.get(pc_id).map(|e| LiveState {
            connected: e.link.is_some(),
            status: e.status,
            last_status_at: e.last_status_at,
        })
    }

    /// Check whether a device has a live connection.
    pub async fn is_connected(&self, pc_id: &str) -> bool {
        self.link(pc_id).await.is_some()
    }

    /// Move the in-memory entry for `from` onto `to` after an identity
    /// merge, discarding the transient `from` entry. The live link (and any
    /// status that raced ahead) carries over; the transport is re-tagged so
    /// future reverse lookups resolve to the canonical identity.
    pub async fn merge_identity(&self, from: &str, to: &str) {
        if from == to {
            return;
        }

        let mut entries = self.entries.write().await;
        let Some(moved) = entries.remove(from) else {
            return;
        };

        let target = entries.entry(to.to_string()).or_default();
        if let Some(link) = moved.link {
            self.by_conn
                .write()
                .await
                .insert(link.conn_id.clone(), to.to_string());
            target.link = Some(link);
        }
        if moved.status.is_some() {
            target.status = moved.status;
            target.last_status_at = moved.last_status_at;
        }
        info!(from = %from, to = %to, "Merged transient identity into canonical entry");
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
