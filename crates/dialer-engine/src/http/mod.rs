//! Control HTTP surface (§6)

mod handlers;
mod routes;

use std::sync::Arc;

use call_service::CallService;

use crate::manager::DialerManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DialerManager>,
    pub call_service: Arc<CallService>,
}

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
