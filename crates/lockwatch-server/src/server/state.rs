//! Shared application state for Axum handlers.

use std::sync::Arc;

use crate::auth::JwtManager;
use crate::broadcast::{Broadcaster, ObserverRegistry};
use crate::probe::{ProbeConfig, Prober};
use crate::registry::EndpointRegistry;
use crate::storage::ServerDatabase;

/// Shared state available to all handlers via `State<AppState>`.
/// Cheaply cloneable; inner data is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub registry: Arc<EndpointRegistry>,
    pub observers: Arc<ObserverRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub prober: Arc<Prober>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    /// Wire up the full component graph around one database handle.
    pub fn new(db: ServerDatabase, jwt: Arc<JwtManager>, probe_config: ProbeConfig) -> Self {
        let registry = Arc::new(EndpointRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            db.clone(),
            Arc::clone(&registry),
            Arc::clone(&observers),
        ));
        let prober = Arc::new(Prober::new(Arc::clone(&registry), db.clone(), probe_config));

        Self {
            db,
            registry,
            observers,
            broadcaster,
            prober,
            jwt,
        }
    }
}
