//! Error types for the Dialer Manager's HTTP surface (§6, §7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Campaign {0} is not active")]
    UnsupportedMode(String),

    #[error("call service error: {0}")]
    CallService(#[from] call_service::CallServiceError),

    #[error("store error: {0}")]
    Store(#[from] dialer_store::StoreError),

    #[error("switch error: {0}")]
    Switch(#[from] switch_driver::SwitchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnsupportedMode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CallService(_) | Self::Store(_) | Self::Switch(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "unhandled engine error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
