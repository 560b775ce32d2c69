//! Lockwatch server: presence tracking, identity reconciliation, status
//! broadcasting, and remote lock control for endpoint PCs.

pub mod auth;
pub mod broadcast;
pub mod probe;
pub mod registry;
pub mod server;
pub mod storage;
