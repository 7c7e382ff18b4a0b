//! Durable terminal-call record. Written exactly once, by `endCall`, after the
//! fast-path state already holds the terminal status (§4.2, §7).

use chrono::{DateTime, Utc};

use crate::pool::DurablePool;
use crate::Result;

#[derive(Debug, Clone)]
pub struct TerminalCallRecord {
    pub id: String,
    pub tenant_id: String,
    pub campaign_id: Option<String>,
    pub lead_id: Option<String>,
    pub agent_id: Option<String>,
    pub direction: String,
    pub phone_number: String,
    pub caller_id: Option<String>,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub ring_duration_ms: Option<i64>,
    pub talk_duration_ms: i64,
}

pub struct CallRepository<'a> {
    db: &'a DurablePool,
}

impl<'a> CallRepository<'a> {
    pub fn new(db: &'a DurablePool) -> Self {
        Self { db }
    }

    /// Idempotent insert: a retrying reaper must not duplicate the row if the
    /// first attempt actually landed before the connection dropped.
    pub async fn insert_terminal(&self, record: &TerminalCallRecord) -> Result<()> {
        let client = self.db.get().await?;
        client
            .execute(
                "INSERT INTO calls (id, tenant_id, campaign_id, lead_id, agent_id, direction, \
                 phone_number, caller_id, status, start_time, answer_time, end_time, \
                 ring_duration_ms, talk_duration_ms) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) \
                 ON CONFLICT (id) DO NOTHING",
                &[
                    &record.id,
                    &record.tenant_id,
                    &record.campaign_id,
                    &record.lead_id,
                    &record.agent_id,
                    &record.direction,
                    &record.phone_number,
                    &record.caller_id,
                    &record.status,
                    &record.start_time,
                    &record.answer_time,
                    &record.end_time,
                    &record.ring_duration_ms,
                    &record.talk_duration_ms,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let client = self.db.get().await?;
        let row = client
            .query_opt("SELECT 1 FROM calls WHERE id = $1", &[&id])
            .await?;
        Ok(row.is_some())
    }
}
