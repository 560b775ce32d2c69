//! HTTP and WebSocket gateway.

pub mod auth_api;
pub mod devices_api;
pub mod error;
pub mod extract;
pub mod periods_api;
pub mod schedule;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the application router around shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .route("/api/auth/revoke", post(auth_api::revoke))
        .route("/api/devices", get(devices_api::list_devices))
        .route("/api/devices/{id}/probe", post(devices_api::probe_device))
        .route(
            "/api/devices/{id}/command",
            post(devices_api::command_device),
        )
        .route(
            "/api/periods",
            get(periods_api::list_periods).post(periods_api::create_period),
        )
        .route(
            "/api/periods/{id}",
            axum::routing::put(periods_api::update_period).delete(periods_api::delete_period),
        )
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
