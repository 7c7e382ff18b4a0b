//! Switch driver connection configuration

#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub command_timeout_secs: u64,
    pub reconnect_backoff_min_ms: u64,
    pub reconnect_backoff_max_ms: u64,
}

impl SwitchConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SWITCH_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("SWITCH_PORT")
                .unwrap_or_else(|_| "8021".to_string())
                .parse()
                .unwrap_or(8021),
            password: std::env::var("SWITCH_PASSWORD").unwrap_or_else(|_| "ClueCon".to_string()),
            command_timeout_secs: std::env::var("SWITCH_COMMAND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            reconnect_backoff_min_ms: std::env::var("SWITCH_RECONNECT_BACKOFF_MIN_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(200),
            reconnect_backoff_max_ms: std::env::var("SWITCH_RECONNECT_BACKOFF_MAX_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        }
    }
}
