//! Call Service error types

pub type Result<T> = std::result::Result<T, CallServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum CallServiceError {
    #[error("fast-path store error: {0}")]
    FastStore(#[from] dialer_store::StoreError),

    #[error("not found: {0}")]
    NotFound(String),
}
