//! Lead catalog access. The core reads eligibility and writes status/attempt
//! bookkeeping only; it never creates leads (§3).

use chrono::{DateTime, Utc};
use dialer_core::{CampaignId, LeadId, TenantId};
use serde_json::Value;

use crate::pool::DurablePool;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadStatus {
    New,
    Dialing,
    Contacted,
    Rejected,
    Completed,
    DoNotCall,
}

impl LeadStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Dialing => "dialing",
            Self::Contacted => "contacted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::DoNotCall => "do_not_call",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lead {
    pub id: LeadId,
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub phone_number: String,
    pub alternate_number: Option<String>,
    pub priority: i32,
    pub attempt_count: i32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_attempt: Option<DateTime<Utc>>,
    pub custom_fields: Value,
}

pub struct LeadRepository<'a> {
    db: &'a DurablePool,
}

impl<'a> LeadRepository<'a> {
    pub fn new(db: &'a DurablePool) -> Self {
        Self { db }
    }

    /// The eligibility query per §4.3: active leads whose retry interval has
    /// elapsed, ordered priority ascending then last-attempt ascending.
    ///
    /// Leads belong to a campaign via a list (§9 Open Question c); the join
    /// below goes lead -> list -> campaign rather than trusting a denormalized
    /// `campaign_id` column on the lead row.
    pub async fn next_eligible(
        &self,
        campaign_id: &CampaignId,
        retry_interval_secs: i64,
        limit: i64,
    ) -> Result<Vec<Lead>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                "SELECT l.id, l.tenant_id, ll.campaign_id, l.phone_number, l.alternate_number, \
                        l.priority, l.attempt_count, l.last_attempt, l.next_attempt, l.custom_fields \
                 FROM leads l \
                 JOIN lead_lists ll ON ll.id = l.list_id \
                 WHERE ll.campaign_id = $1 \
                   AND l.status = 'new' \
                   AND (l.last_attempt IS NULL \
                        OR l.last_attempt < NOW() - ($2 || ' seconds')::interval) \
                 ORDER BY l.priority ASC, l.last_attempt ASC NULLS FIRST \
                 LIMIT $3",
                &[&campaign_id.as_str(), &retry_interval_secs.to_string(), &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_lead).collect())
    }

    /// Bump attempt bookkeeping after an originate. Monotone by construction:
    /// attempt_count only increases, last_attempt only moves forward (DB clock).
    pub async fn record_attempt(&self, id: &LeadId) -> Result<()> {
        let client = self.db.get().await?;
        client
            .execute(
                "UPDATE leads SET attempt_count = attempt_count + 1, last_attempt = NOW(), \
                 status = 'dialing' WHERE id = $1",
                &[&id.as_str()],
            )
            .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: &LeadId, status: LeadStatus, note: Option<&str>) -> Result<()> {
        let client = self.db.get().await?;
        if let Some(note) = note {
            client
                .execute(
                    "UPDATE leads SET status = $2, \
                     custom_fields = custom_fields || jsonb_build_object('note', $3::text) \
                     WHERE id = $1",
                    &[&id.as_str(), &status.as_db_str(), &note],
                )
                .await?;
        } else {
            client
                .execute(
                    "UPDATE leads SET status = $2 WHERE id = $1",
                    &[&id.as_str(), &status.as_db_str()],
                )
                .await?;
        }
        Ok(())
    }

    /// Records the skipping agent id so the lead can be offered to someone else
    /// (§4.5 `skipPreview`).
    pub async fn record_skip(&self, id: &LeadId, agent_id: &str) -> Result<()> {
        let client = self.db.get().await?;
        client
            .execute(
                "UPDATE leads SET custom_fields = \
                 custom_fields || jsonb_build_object('skippedBy', $2::text) WHERE id = $1",
                &[&id.as_str(), &agent_id],
            )
            .await?;
        Ok(())
    }
}

fn row_to_lead(row: &tokio_postgres::Row) -> Lead {
    Lead {
        id: LeadId::new(row.get::<_, String>("id")),
        tenant_id: TenantId::new(row.get::<_, String>("tenant_id")),
        campaign_id: CampaignId::new(row.get::<_, String>("campaign_id")),
        phone_number: row.get("phone_number"),
        alternate_number: row.get("alternate_number"),
        priority: row.get("priority"),
        attempt_count: row.get("attempt_count"),
        last_attempt: row.get("last_attempt"),
        next_attempt: row.get("next_attempt"),
        custom_fields: row.get("custom_fields"),
    }
}
