//! Fast keyed-value store for live call and agent state (§4.2).
//!
//! Backed by Redis. Every live entry carries the 24h TTL mandated by the spec; the
//! key layout below matches the Call Service's operation table exactly:
//!
//!   call:{id}               -- hash, serialized Call snapshot
//!   agent:{id}               -- hash, serialized AgentStatus snapshot
//!   campaign:calls:{id}     -- set of call ids owned by a campaign
//!   calls:active             -- set of call ids not yet terminal
//!   index:agent:calls:{id}  -- set of call ids an agent has touched

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::Result;

pub const LIVE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct FastStoreConfig {
    pub url: String,
}

impl FastStoreConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("FAST_STORE_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        }
    }
}

/// Thin wrapper over a Redis connection manager; reconnects transparently.
#[derive(Clone)]
pub struct FastStore {
    conn: ConnectionManager,
}

impl FastStore {
    pub async fn connect(config: FastStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await.is_ok()
    }

    /// Write a JSON-serialized value at `key` and refresh its TTL.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, payload, LIVE_TTL.as_secs()).await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(set_key, member).await?;
        conn.expire::<_, ()>(set_key, LIVE_TTL.as_secs() as i64).await?;
        Ok(())
    }

    pub async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(set_key, member).await?;
        Ok(())
    }

    pub async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(set_key).await?)
    }
}
