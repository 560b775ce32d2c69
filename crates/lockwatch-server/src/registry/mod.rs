//! In-memory presence registry for endpoint devices.
//!
//! Single source of truth for "is this device reachable right now". Entries
//! are created lazily and never deleted; a disconnected entry keeps its last
//! reported status for the lifetime of the process.

mod connection;
pub mod reconcile;

pub use connection::{DeviceLink, EndpointRegistry, LiveState, StatusChange};
