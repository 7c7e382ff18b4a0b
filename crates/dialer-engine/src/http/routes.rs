//! Router configuration for the Dialer Manager control surface (§6)

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/campaigns/start", post(handlers::start_campaign))
        .route("/campaigns/stop", post(handlers::stop_campaign))
        .route("/campaigns/active", get(handlers::active_campaigns))
        .route("/campaigns/{id}/status", get(handlers::campaign_status))
        .route("/campaigns/{id}/calls", get(handlers::campaign_calls))
        .route("/preview/request", post(handlers::preview_request))
        .route("/preview/accept", post(handlers::preview_accept))
        .route("/preview/reject", post(handlers::preview_reject))
        .route("/preview/skip", post(handlers::preview_skip))
        .route("/calls/active", get(handlers::active_calls))
        .route("/calls/{id}", get(handlers::get_call))
        .route("/agents/status", post(handlers::update_agent_status))
        .route("/agents/available", get(handlers::available_agents))
        .route("/agents/{id}/status", get(handlers::get_agent_status))
        .with_state(state)
}
