//! The registry's HTTP surface (spec.md §4.2), grounded on the
//! `Router::new().route(...)` + `State<AppState>` style in
//! `FlexNetOS-noa_ark_os`'s gateway `main.rs`.

pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{delete, get, head, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agents/register", post(handlers::handle_agent_request))
        .route("/heartbeat", post(handlers::handle_agent_request))
        .route("/heartbeat/:agent_id", head(handlers::handle_heartbeat_head))
        .route("/agents/:agent_id", delete(handlers::handle_delete_agent))
        .route("/agents", get(handlers::handle_list_agents))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
