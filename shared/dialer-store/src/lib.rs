//! Dialer Store
//!
//! Durable (PostgreSQL, via deadpool-postgres) and fast-path (Redis) storage for
//! the dialer platform: the "two-tier store" described in §4.2, plus read-only
//! access to the campaign/lead catalog described in §3.

mod calls;
mod campaigns;
mod error;
mod fast;
mod leads;
mod pool;

pub use calls::{CallRepository, TerminalCallRecord};
pub use campaigns::{Campaign, CampaignRepository, CampaignSettings, CampaignStatus, DialMode, ScheduleWindow};
pub use error::{Result, StoreError};
pub use fast::{FastStore, FastStoreConfig, LIVE_TTL};
pub use leads::{Lead, LeadRepository, LeadStatus};
pub use pool::{DurablePool, PoolConfig, PoolStats};

pub use tokio_postgres::{types::ToSql, Row, Statement};
