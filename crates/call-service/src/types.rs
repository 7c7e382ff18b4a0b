//! Call and agent-status entities (§3)

use chrono::{DateTime, Utc};
use dialer_core::{AgentId, CallId, CampaignId, LeadId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    Connected,
    Completed,
    Abandoned,
    Failed,
    NoAnswer,
    Busy,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Abandoned | Self::Failed | Self::NoAnswer | Self::Busy
        )
    }

    /// The canonical string form shared by the durable store, the event bus,
    /// and the `snake_case` wire format (§3) -- one constant, three consumers.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    pub tenant_id: TenantId,
    pub campaign_id: Option<CampaignId>,
    pub lead_id: Option<LeadId>,
    pub agent_id: Option<AgentId>,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub phone_number: String,
    pub caller_id: Option<String>,
    pub switch_uuid: Option<String>,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

impl Call {
    pub fn ring_duration_ms(&self) -> Option<i64> {
        self.answer_time.map(|a| (a - self.start_time).num_milliseconds())
    }

    pub fn talk_duration_ms(&self, at: DateTime<Utc>) -> i64 {
        self.answer_time.map(|a| (at - a).num_milliseconds()).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct CreateCallInput {
    pub tenant_id: TenantId,
    pub direction: CallDirection,
    pub phone_number: String,
    pub caller_id: Option<String>,
    pub campaign_id: Option<CampaignId>,
    pub lead_id: Option<LeadId>,
    pub metadata: Option<Value>,
}

/// Patch applied by `updateCall`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateCallPatch {
    pub status: Option<CallStatus>,
    pub switch_uuid: Option<String>,
    pub agent_id: Option<Option<AgentId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Available,
    OnCall,
    WrapUp,
    Break,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusRecord {
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub state: AgentState,
    pub current_call_id: Option<CallId>,
    pub last_state_change: DateTime<Utc>,
    pub calls_handled: u64,
}
