//! Lockwatch wire protocol.
//!
//! Typed events exchanged over the single `/ws` endpoint as tagged JSON.
//! The transport is fire-and-forget: requests and replies are correlated
//! by explicit probe tokens, never by the transport itself.

use serde::{Deserialize, Serialize};

/// Lock state reported by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Locked,
    Unlocked,
    Unknown,
}

impl LockStatus {
    /// String form stored in the `devices.last_status` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a persisted status string. Anything unrecognised maps to
    /// `Unknown` rather than failing a row read.
    pub fn from_db(s: &str) -> Self {
        match s {
            "locked" => Self::Locked,
            "unlocked" => Self::Unlocked,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a freshly-announced connection claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Controlled endpoint reporting lock state.
    Endpoint,
    /// Owner-facing dashboard; tracked only as an observer session.
    Dashboard,
}

/// Action an owner can dispatch to a connected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Lock,
    Unlock,
}

/// Events a client may send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First event on a device connection. `owner_token`, when present and
    /// valid, carries the ownership context for a never-seen device.
    Announce {
        pc_id: String,
        #[serde(default)]
        name: Option<String>,
        kind: ClientKind,
        #[serde(default)]
        ip: Option<String>,
        #[serde(default)]
        owner_token: Option<String>,
    },
    /// Ordinary status report. `pc_id` may be omitted once the connection
    /// has announced; the server resolves it by reverse lookup.
    StatusReport {
        #[serde(default)]
        pc_id: Option<String>,
        status: LockStatus,
    },
    /// Explicit answer to a `StatusRequest`, correlated by token.
    StatusReply {
        probe_token: String,
        status: LockStatus,
    },
    /// Identify as an observer session for the token's owner. A missing or
    /// invalid token places the session in the discard group.
    Subscribe {
        #[serde(default)]
        token: Option<String>,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// On-demand status probe sent to one endpoint.
    StatusRequest { probe_token: String },
    /// Full merged device list for the receiving observer's owner.
    DeviceListUpdate { devices: Vec<DeviceView> },
    /// Block-period schedule push. Never sent with an empty list.
    ScheduleUpdate { periods: Vec<BlockPeriodView> },
    /// Lock/unlock command dispatched to one endpoint.
    Command { action: CommandAction },
}

/// Merged per-device view: live state layered over the persisted fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    pub pc_id: String,
    pub name: String,
    pub status: LockStatus,
    pub connected: bool,
    #[serde(default)]
    pub last_status_at: Option<i64>,
    pub last_seen: i64,
    #[serde(default)]
    pub ip: Option<String>,
}

/// A time window during which the endpoint enforces the lock locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPeriodView {
    pub id: String,
    pub from_time: String,
    pub to_time: String,
    /// Weekday tokens; empty means every day.
    pub days: Vec<String>,
}
