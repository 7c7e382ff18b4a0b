//! Reconnect-with-backoff state for the switch driver's long-lived connection.
//!
//! The state-tracking idiom here (atomics for counters, an `RwLock` for the
//! current phase) generalizes the carrier circuit breaker's allow/record shape
//! to a connect/disconnect lifecycle instead of a request-failure lifecycle.

use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct ReconnectPolicy {
    pub state: RwLock<ConnectionState>,
    attempt: AtomicU32,
    base: Duration,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            attempt: AtomicU32::new(0),
            base,
            max,
        }
    }

    /// Exponential backoff with full jitter, capped at `max`.
    pub fn next_delay(&self) -> Duration {
        let attempt = self.attempt.fetch_add(1, Ordering::Relaxed);
        let exp = self.base.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max.as_millis());
        let jittered = rand::random::<f64>() * capped as f64;
        Duration::from_millis(jittered as u64).max(self.base)
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::Relaxed);
    }

    pub async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    pub async fn get_state(&self) -> ConnectionState {
        *self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_millis(1000));
        for _ in 0..20 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn reset_restarts_from_base() {
        let policy = ReconnectPolicy::new(Duration::from_millis(50), Duration::from_millis(5000));
        for _ in 0..10 {
            policy.next_delay();
        }
        policy.reset();
        // first delay after reset draws from attempt=0, same ceiling as a fresh policy
        let delay = policy.next_delay();
        assert!(delay <= Duration::from_millis(5000));
    }
}
