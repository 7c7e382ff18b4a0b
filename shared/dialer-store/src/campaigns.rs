//! Campaign catalog access. The core only reads campaigns; rows are created and
//! mutated by the external CRUD surface (§3).

use chrono::{DateTime, NaiveTime, Utc};
use dialer_core::{CampaignId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pool::DurablePool;
use crate::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialMode {
    Predictive,
    Progressive,
    Preview,
}

impl DialMode {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "predictive" => Some(Self::Predictive),
            "progressive" => Some(Self::Progressive),
            "preview" => Some(Self::Preview),
            _ => None,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Predictive => "predictive",
            Self::Progressive => "progressive",
            Self::Preview => "preview",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Time-of-day gate on originates. See SPEC_FULL.md Open Question (a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        }
    }
}

/// Per-campaign policy, decoded once on campaign load rather than per tick
/// (SPEC_FULL.md Design Notes §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    pub ring_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_interval_secs: i64,
    pub wrap_up_secs: u64,
    pub dial_ratio_min: f64,
    pub dial_ratio_max: f64,
    pub abandon_rate_target: f64,
    pub wait_for_agent_secs: u64,
    pub auto_dial_after_preview: bool,
    pub preview_time_secs: u64,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 30,
            max_attempts: 5,
            retry_interval_secs: 1800,
            wrap_up_secs: 30,
            dial_ratio_min: 1.2,
            dial_ratio_max: 2.5,
            abandon_rate_target: 0.03,
            wait_for_agent_secs: 10,
            auto_dial_after_preview: false,
            preview_time_secs: 30,
        }
    }
}

impl CampaignSettings {
    /// Decode from the catalog's free-form JSON settings blob, falling back to
    /// defaults for any field that is absent or malformed.
    pub fn from_json(value: &Value) -> Self {
        let default = Self::default();
        let get_f64 = |k: &str, d: f64| value.get(k).and_then(Value::as_f64).unwrap_or(d);
        let get_u64 = |k: &str, d: u64| value.get(k).and_then(Value::as_u64).unwrap_or(d);
        let get_i64 = |k: &str, d: i64| value.get(k).and_then(Value::as_i64).unwrap_or(d);
        let get_bool = |k: &str, d: bool| value.get(k).and_then(Value::as_bool).unwrap_or(d);

        Self {
            ring_timeout_secs: get_u64("ringTimeoutSecs", default.ring_timeout_secs),
            max_attempts: get_u64("maxAttempts", default.max_attempts as u64) as u32,
            retry_interval_secs: get_i64("retryIntervalSecs", default.retry_interval_secs),
            wrap_up_secs: get_u64("wrapUpSecs", default.wrap_up_secs),
            dial_ratio_min: get_f64("dialRatioMin", default.dial_ratio_min),
            dial_ratio_max: get_f64("dialRatioMax", default.dial_ratio_max),
            abandon_rate_target: get_f64("abandonRateTarget", default.abandon_rate_target),
            wait_for_agent_secs: get_u64("waitForAgentSecs", default.wait_for_agent_secs),
            auto_dial_after_preview: get_bool(
                "autoDialAfterPreview",
                default.auto_dial_after_preview,
            ),
            preview_time_secs: get_u64("previewTimeSecs", default.preview_time_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub mode: DialMode,
    pub status: CampaignStatus,
    pub settings: CampaignSettings,
    pub schedule: Option<ScheduleWindow>,
    pub created_at: DateTime<Utc>,
}

pub struct CampaignRepository<'a> {
    db: &'a DurablePool,
}

impl<'a> CampaignRepository<'a> {
    pub fn new(db: &'a DurablePool) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                "SELECT id, tenant_id, dial_mode, status, settings, schedule, created_at \
                 FROM campaigns WHERE id = $1",
                &[&id.as_str()],
            )
            .await?;

        Ok(row.map(|r| row_to_campaign(&r)))
    }

    /// Mark a campaign's status. Used only by the campaign-lifecycle endpoints if
    /// the core is ever promoted to own lifecycle writes; today `startCampaign`
    /// only reads the row (§4.6) and the Manager tracks "active" in-process.
    pub async fn set_status(&self, id: &CampaignId, status: CampaignStatus) -> Result<()> {
        let client = self.db.get().await?;
        let status_str = match status {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        };
        client
            .execute(
                "UPDATE campaigns SET status = $2 WHERE id = $1",
                &[&id.as_str(), &status_str],
            )
            .await?;
        Ok(())
    }
}

fn row_to_campaign(row: &tokio_postgres::Row) -> Campaign {
    let mode_str: String = row.get("dial_mode");
    let status_str: String = row.get("status");
    let settings_json: Value = row.get("settings");
    let schedule_json: Option<Value> = row.get("schedule");

    Campaign {
        id: CampaignId::new(row.get::<_, String>("id")),
        tenant_id: TenantId::new(row.get::<_, String>("tenant_id")),
        mode: DialMode::from_db(&mode_str).unwrap_or(DialMode::Predictive),
        status: CampaignStatus::from_db(&status_str).unwrap_or(CampaignStatus::Draft),
        settings: CampaignSettings::from_json(&settings_json),
        schedule: schedule_json.and_then(|v| serde_json::from_value(v).ok()),
        created_at: row.get("created_at"),
    }
}

impl From<StoreError> for dialer_core::DialerError {
    fn from(e: StoreError) -> Self {
        dialer_core::DialerError::Database(e.to_string())
    }
}
