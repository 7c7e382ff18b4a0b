//! Error types for the switch driver

pub type Result<T> = std::result::Result<T, SwitchError>;

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("not connected to switch")]
    NotConnected,

    #[error("command rejected by switch: {0}")]
    CommandFailed(String),

    #[error("command timed out waiting for switch reply")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("circuit open for destination {0}")]
    CircuitOpen(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
