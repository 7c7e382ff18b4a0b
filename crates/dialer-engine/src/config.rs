//! Dialer Manager process configuration.
//!
//! Per-campaign policy (ring timeout, dial-ratio bounds, ...) lives in
//! `dialer_store::CampaignSettings` and is decoded once per campaign load;
//! this module covers only what the process needs before any campaign exists.

use dialer_core::DialerError;
use dialer_store::{FastStoreConfig, PoolConfig};
use switch_driver::SwitchConfig;

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub brokers: String,
    pub topic_started: String,
    pub topic_answered: String,
    pub topic_ended: String,
}

impl EventBusConfig {
    pub fn from_env() -> Self {
        Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
            topic_started: std::env::var("EVENT_TOPIC_STARTED")
                .unwrap_or_else(|_| "calls.started".to_string()),
            topic_answered: std::env::var("EVENT_TOPIC_ANSWERED")
                .unwrap_or_else(|_| "calls.answered".to_string()),
            topic_ended: std::env::var("EVENT_TOPIC_ENDED").unwrap_or_else(|_| "calls.ended".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub sweep_interval_secs: u64,
    pub ring_grace_secs: u64,
    pub initiated_stuck_secs: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 10,
            ring_grace_secs: 5,
            initiated_stuck_secs: 60,
        }
    }
}

impl WatchdogConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            sweep_interval_secs: std::env::var("WATCHDOG_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.sweep_interval_secs),
            ring_grace_secs: std::env::var("WATCHDOG_RING_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.ring_grace_secs),
            initiated_stuck_secs: default.initiated_stuck_secs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub http_bind: String,
    pub switch: SwitchConfig,
    pub pool: PoolConfig,
    pub fast_store: FastStoreConfig,
    pub event_bus: EventBusConfig,
    pub watchdog: WatchdogConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, DialerError> {
        Ok(Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            switch: SwitchConfig::from_env(),
            pool: PoolConfig::from_env(),
            fast_store: FastStoreConfig::from_env(),
            event_bus: EventBusConfig::from_env(),
            watchdog: WatchdogConfig::from_env(),
        })
    }
}
