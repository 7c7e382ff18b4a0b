//! Storage error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable connection error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("durable pool error: {0}")]
    Pool(String),

    #[error("fast-path store error: {0}")]
    FastPath(#[from] redis::RedisError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row not found")]
    NotFound,
}
