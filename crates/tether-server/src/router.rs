use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

pub const STATUS_UPDATE_PATH: &str = "/friendshipper-ue/status/update";
pub const FRIENDLY_NAMES_PATH: &str = "/friendshipper-ue/ofpa/friendlynames";

/// Build the axum router with every inbound endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(STATUS_UPDATE_PATH, post(handler::status_update_handler))
        .route(FRIENDLY_NAMES_PATH, post(handler::friendly_names_handler))
        .route("/health", get(handler::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
