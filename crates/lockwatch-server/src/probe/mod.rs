//! Synchronous-style status probe over the fire-and-forget transport.
//!
//! A probe is a future keyed by a correlation token, raced against
//! explicit timeouts at every phase. Devices on old firmware never send
//! the explicit reply; any ordinary status report from the probed device
//! satisfies the probe instead (compatibility fallback), and a final
//! polling phase catches reports that arrive after the reply window.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use lockwatch_core::db::unix_timestamp;
use lockwatch_proto::{LockStatus, ServerEvent};

use crate::registry::{DeviceLink, EndpointRegistry};
use crate::storage::ServerDatabase;

/// Phase bounds for a single probe. Every wait is explicit and finite.
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    /// How long to keep rescanning for a live link before giving up.
    pub resolve_window: Duration,
    pub resolve_poll: Duration,
    /// How long to wait for an explicit or implicit reply.
    pub reply_timeout: Duration,
    /// How long the legacy status-advance polling phase may run.
    pub legacy_window: Duration,
    pub legacy_poll: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            resolve_window: Duration::from_secs(2),
            resolve_poll: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(3),
            legacy_window: Duration::from_secs(3),
            legacy_poll: Duration::from_millis(100),
        }
    }
}

/// Result of a completed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: LockStatus,
    pub last_status_at: Option<i64>,
    /// True when a live device answered; false for a stale persisted read.
    pub probed: bool,
    /// True when the result is the persisted fallback for an unreachable
    /// device, not a live answer.
    pub stale: bool,
}

/// A failed probe. "No answer" is deliberately distinct from a confirmed
/// `Unknown` status: the device was there but never responded.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("device offline, retry later: {0}")]
    Offline(String),

    #[error("no answer from device: {0}")]
    NoAnswer(String),
}

/// Runs probes against the live registry with a persisted fallback.
pub struct Prober {
    registry: Arc<EndpointRegistry>,
    db: ServerDatabase,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(registry: Arc<EndpointRegistry>, db: ServerDatabase, config: ProbeConfig) -> Self {
        Self {
            registry,
            db,
            config,
        }
    }

    /// Probe a device for its current lock status.
    pub async fn probe(&self, pc_id: &str) -> Result<ProbeOutcome, ProbeError> {
        let started_at = unix_timestamp();

        let Some(link) = self.resolve_link(pc_id).await else {
            return self.stale_fallback(pc_id).await;
        };

        if let Some(outcome) = self.fast_path(pc_id, &link).await {
            return Ok(outcome);
        }

        self.legacy_poll(pc_id, started_at).await
    }

    /// Rescan for a live link, covering the window where registry
    /// bookkeeping lags a reconnect.
    async fn resolve_link(&self, pc_id: &str) -> Option<Arc<DeviceLink>> {
        let deadline = Instant::now() + self.config.resolve_window;
        loop {
            if let Some(link) = self.registry.link(pc_id).await {
                return Some(link);
            }
            if Instant::now() + self.config.resolve_poll > deadline {
                return None;
            }
            sleep(self.config.resolve_poll).await;
        }
    }

    /// Send a tagged status request and wait for the token's waiter to be
    /// completed -- by the explicit reply or by any status report from the
    /// same device. The waiter is always detached before returning.
    async fn fast_path(&self, pc_id: &str, link: &Arc<DeviceLink>) -> Option<ProbeOutcome> {
        let probe_token = uuid::Uuid::new_v4().to_string();
        let reply_rx = link.register_pending(probe_token.clone()).await;

        let sent = link
            .send(ServerEvent::StatusRequest {
                probe_token: probe_token.clone(),
            })
            .await;
        if sent.is_err() {
            warn!(pc_id = %pc_id, "Status request not deliverable, transport closing");
            link.cancel_pending(&probe_token).await;
            return None;
        }

        match timeout(self.config.reply_timeout, reply_rx).await {
            Ok(Ok(status)) => {
                debug!(pc_id = %pc_id, status = %status, "Probe answered");
                let last_status_at = self
                    .registry
                    .live(pc_id)
                    .await
                    .and_then(|l| l.last_status_at)
                    .or_else(|| Some(unix_timestamp()));
                Some(ProbeOutcome {
                    status,
                    last_status_at,
                    probed: true,
                    stale: false,
                })
            }
            _ => {
                link.cancel_pending(&probe_token).await;
                None
            }
        }
    }

    /// Legacy fallback: any status report after probe start counts as
    /// success, even without the explicit reply protocol.
    async fn legacy_poll(
        &self,
        pc_id: &str,
        started_at: i64,
    ) -> Result<ProbeOutcome, ProbeError> {
        let deadline = Instant::now() + self.config.legacy_window;
        loop {
            if let Some(live) = self.registry.live(pc_id).await
                && let (Some(status), Some(at)) = (live.status, live.last_status_at)
                && at >= started_at
            {
                debug!(pc_id = %pc_id, "Probe satisfied by status advance");
                return Ok(ProbeOutcome {
                    status,
                    last_status_at: Some(at),
                    probed: true,
                    stale: false,
                });
            }
            if Instant::now() + self.config.legacy_poll > deadline {
                return Err(ProbeError::NoAnswer(pc_id.to_string()));
            }
            sleep(self.config.legacy_poll).await;
        }
    }

    /// Device never resolved: degrade to the persisted last status when
    /// one exists, else fail as offline.
    async fn stale_fallback(&self, pc_id: &str) -> Result<ProbeOutcome, ProbeError> {
        match self.db.get_device(pc_id).await {
            Ok(row) if row.last_status_at.is_some() => Ok(ProbeOutcome {
                status: LockStatus::from_db(&row.last_status),
                last_status_at: row.last_status_at,
                probed: false,
                stale: true,
            }),
            _ => Err(ProbeError::Offline(pc_id.to_string())),
        }
    }
}
