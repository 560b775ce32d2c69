//! WebSocket gateway: the single `/ws` endpoint for endpoints and
//! observers.
//!
//! A connection's role is decided by its first meaningful event:
//! `announce` makes it a device link, `subscribe` makes it an observer.
//! Announces carrying the dashboard client kind are treated as
//! subscribes for older dashboard builds that only speak `announce`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lockwatch_core::db::unix_timestamp;
use lockwatch_proto::{ClientEvent, ClientKind, LockStatus, ServerEvent};

use crate::registry::DeviceLink;
use crate::registry::reconcile::resolve_identity;

use super::schedule;
use super::state::AppState;

const OUTBOUND_BUFFER: usize = 64;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Per-connection state accumulated as events arrive.
struct Connection {
    conn_id: String,
    peer_ip: String,
    outbound: mpsc::Sender<ServerEvent>,
    /// Present once this connection has acted as a device.
    link: Option<Arc<DeviceLink>>,
    /// Canonical device identity after reconciliation.
    device_id: Option<String>,
    observing: bool,
}

impl Connection {
    /// Lazily create the device link for this transport. A status report
    /// can arrive before any announce; the link must exist either way.
    fn device_link(&mut self) -> Arc<DeviceLink> {
        if let Some(link) = &self.link {
            return Arc::clone(link);
        }
        let link = Arc::new(DeviceLink::new(
            self.conn_id.clone(),
            self.outbound.clone(),
        ));
        self.link = Some(Arc::clone(&link));
        link
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    debug!(conn_id = %conn_id, peer = %addr, "WebSocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Outbound event serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut conn = Connection {
        conn_id: conn_id.clone(),
        peer_ip: addr.ip().to_string(),
        outbound: outbound_tx,
        link: None,
        device_id: None,
        observing: false,
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "Unparseable client event dropped");
                        continue;
                    }
                };
                handle_event(&state, &mut conn, event).await;
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    cleanup(&state, &conn).await;
    send_task.abort();
    debug!(conn_id = %conn_id, "WebSocket closed");
}

async fn handle_event(state: &AppState, conn: &mut Connection, event: ClientEvent) {
    match event {
        ClientEvent::Announce {
            pc_id,
            name,
            kind,
            ip,
            owner_token,
        } => {
            if kind == ClientKind::Dashboard {
                subscribe(state, conn, owner_token).await;
            } else {
                announce_device(state, conn, pc_id, name, ip, owner_token).await;
            }
        }
        ClientEvent::StatusReport { pc_id, status } => {
            report_status(state, conn, pc_id, status).await;
        }
        ClientEvent::StatusReply {
            probe_token,
            status,
        } => {
            if let Some(link) = &conn.link {
                if !link.complete_pending(&probe_token, status).await {
                    debug!(probe_token = %probe_token, "Reply to unknown or expired probe");
                }
            }
        }
        ClientEvent::Subscribe { token } => {
            subscribe(state, conn, token).await;
        }
    }
}

async fn announce_device(
    state: &AppState,
    conn: &mut Connection,
    pc_id: String,
    name: Option<String>,
    ip: Option<String>,
    owner_token: Option<String>,
) {
    let owner_claim = owner_token.and_then(|t| state.jwt.owner_of(&t));
    let ip = ip.unwrap_or_else(|| conn.peer_ip.clone());

    let resolution = resolve_identity(
        &state.db,
        &state.registry,
        &pc_id,
        name.as_deref(),
        owner_claim.as_deref(),
        Some(&ip),
    )
    .await;

    info!(
        conn_id = %conn.conn_id,
        announced = %pc_id,
        canonical = %resolution.pc_id,
        "Device announced"
    );

    let link = conn.device_link();

    // Hydrate live state from the persisted row only when the device has
    // actually reported before; a bare row must stay "never reported".
    let hydrate = match state.db.get_device(&resolution.pc_id).await {
        Ok(row) if row.last_status_at.is_some() => {
            Some((LockStatus::from_db(&row.last_status), row.last_status_at))
        }
        Ok(_) => None,
        Err(e) => {
            warn!(pc_id = %resolution.pc_id, error = %e, "Device read failed during announce");
            None
        }
    };

    state.registry.attach(&resolution.pc_id, link, hydrate).await;
    conn.device_id = Some(resolution.pc_id);

    if let Some(owner_id) = &resolution.owner_id {
        schedule::push_schedule(state, owner_id).await;
    }
    state.broadcaster.broadcast_all().await;
}

async fn report_status(
    state: &AppState,
    conn: &mut Connection,
    claimed: Option<String>,
    status: LockStatus,
) {
    let link = conn.device_link();
    let claimed = claimed.as_deref().or(conn.device_id.as_deref());

    let Some(change) = state.registry.report_status(claimed, &link, status).await else {
        return;
    };

    // Any ordinary report satisfies every outstanding probe on this link.
    link.complete_all_pending(status).await;

    conn.device_id = Some(change.pc_id.clone());

    if let Err(e) = state
        .db
        .upsert_device_status(&change.pc_id, change.status.as_str(), change.at)
        .await
    {
        warn!(pc_id = %change.pc_id, error = %e, "Status persistence failed");
    }

    state.broadcaster.broadcast_all().await;
}

async fn subscribe(state: &AppState, conn: &mut Connection, token: Option<String>) {
    if !conn.observing {
        state
            .observers
            .add(conn.conn_id.clone(), conn.outbound.clone())
            .await;
        conn.observing = true;
    }

    let Some(owner_id) = token.and_then(|t| state.jwt.owner_of(&t)) else {
        debug!(conn_id = %conn.conn_id, "Unauthenticated subscribe, session parked");
        return;
    };

    state
        .observers
        .authenticate(&conn.conn_id, owner_id.clone())
        .await;
    info!(conn_id = %conn.conn_id, owner_id = %owner_id, "Observer subscribed");

    state.broadcaster.send_snapshot(&owner_id).await;
}

async fn cleanup(state: &AppState, conn: &Connection) {
    if let Some(link) = &conn.link {
        link.cancel_all_pending().await;

        if let Some(pc_id) = state.registry.disconnect(&conn.conn_id).await {
            if let Err(e) = state.db.update_last_seen(&pc_id, unix_timestamp()).await {
                warn!(pc_id = %pc_id, error = %e, "last_seen update failed on disconnect");
            }
            info!(conn_id = %conn.conn_id, pc_id = %pc_id, "Device disconnected");
            state.broadcaster.broadcast_all().await;
        }
    }

    if conn.observing {
        state.observers.remove(&conn.conn_id).await;
    }
}
