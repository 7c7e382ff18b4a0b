//! Call Service: fast keyed-value store for live state, durable row on
//! terminal transition (§4.2).

use std::sync::Arc;

use chrono::Utc;
use dialer_core::{AgentId, CallId, TenantId};
use dialer_store::{CallRepository, DurablePool, FastStore, TerminalCallRecord};
use tracing::{error, warn};

use crate::error::Result;
use crate::types::{AgentState, AgentStatusRecord, Call, CallDirection, CallStatus, CreateCallInput, UpdateCallPatch};

fn call_key(id: &CallId) -> String {
    format!("call:{}", id.as_str())
}

fn agent_key(id: &AgentId) -> String {
    format!("agent:{}", id.as_str())
}

fn campaign_calls_key(campaign_id: &str) -> String {
    format!("campaign:calls:{}", campaign_id)
}

const ACTIVE_CALLS_KEY: &str = "calls:active";

fn tenant_agents_key(tenant_id: &TenantId) -> String {
    format!("tenant:agents:{}", tenant_id.as_str())
}

#[derive(Clone)]
pub struct CallService {
    fast: FastStore,
    durable: Arc<DurablePool>,
}

impl CallService {
    pub fn new(fast: FastStore, durable: Arc<DurablePool>) -> Self {
        Self { fast, durable }
    }

    pub async fn create_call(&self, input: CreateCallInput) -> Result<Call> {
        let call = Call {
            id: CallId::generate(),
            tenant_id: input.tenant_id,
            campaign_id: input.campaign_id.clone(),
            lead_id: input.lead_id,
            agent_id: None,
            direction: input.direction,
            status: CallStatus::Initiated,
            phone_number: input.phone_number,
            caller_id: input.caller_id,
            switch_uuid: None,
            start_time: Utc::now(),
            answer_time: None,
            end_time: None,
            metadata: input.metadata.unwrap_or(serde_json::json!({})),
        };

        self.fast.put(&call_key(&call.id), &call).await?;
        self.fast.set_add(ACTIVE_CALLS_KEY, call.id.as_str()).await?;
        if let Some(campaign_id) = &call.campaign_id {
            self.fast
                .set_add(&campaign_calls_key(campaign_id.as_str()), call.id.as_str())
                .await?;
        }

        Ok(call)
    }

    pub async fn get_call(&self, id: &CallId) -> Result<Option<Call>> {
        Ok(self.fast.get(&call_key(id)).await?)
    }

    /// Merges `patch` into the live snapshot and refreshes its TTL. Returns
    /// `None` if the call is not in the fast store.
    pub async fn update_call(&self, id: &CallId, patch: UpdateCallPatch) -> Result<Option<Call>> {
        let Some(mut call) = self.get_call(id).await? else {
            return Ok(None);
        };

        if let Some(status) = patch.status {
            call.status = status;
        }
        if let Some(uuid) = patch.switch_uuid {
            call.switch_uuid = Some(uuid);
        }
        if let Some(agent_id) = patch.agent_id {
            call.agent_id = agent_id;
        }

        self.fast.put(&call_key(id), &call).await?;
        Ok(Some(call))
    }

    pub async fn answer_call(&self, id: &CallId, agent_id: Option<AgentId>) -> Result<Option<Call>> {
        let Some(mut call) = self.get_call(id).await? else {
            return Ok(None);
        };

        call.status = CallStatus::Answered;
        call.answer_time = Some(Utc::now());
        if agent_id.is_some() {
            call.agent_id = agent_id;
        }

        self.fast.put(&call_key(id), &call).await?;
        Ok(Some(call))
    }

    /// Sets the terminal status, removes the call from the active index, and
    /// persists durably exactly once. If the durable write fails the fast
    /// state is retained with the terminal status already set, so a reaper
    /// can retry later (§7 "durable write failure"); the call is still
    /// published by the caller regardless of the write outcome.
    ///
    /// Returns `Ok(None)` both when the call does not exist and when it is
    /// already terminal -- a second hangup for the same channel must not
    /// look like a fresh termination to the caller.
    pub async fn end_call(&self, id: &CallId, status: CallStatus) -> Result<Option<Call>> {
        let Some(mut call) = self.get_call(id).await? else {
            return Ok(None);
        };

        if call.status.is_terminal() {
            // Idempotent re-application: state is unchanged and the caller
            // must not treat this as a fresh termination (§8 "at-most-one
            // event after the first call").
            return Ok(None);
        }

        let now = Utc::now();
        call.status = status;
        call.end_time = Some(now);

        self.fast.put(&call_key(id), &call).await?;
        self.fast.set_remove(ACTIVE_CALLS_KEY, id.as_str()).await?;
        if let Some(campaign_id) = &call.campaign_id {
            self.fast
                .set_remove(&campaign_calls_key(campaign_id.as_str()), id.as_str())
                .await?;
        }

        let record = TerminalCallRecord {
            id: call.id.as_str().to_string(),
            tenant_id: call.tenant_id.as_str().to_string(),
            campaign_id: call.campaign_id.as_ref().map(|c| c.as_str().to_string()),
            lead_id: call.lead_id.as_ref().map(|l| l.as_str().to_string()),
            agent_id: call.agent_id.as_ref().map(|a| a.as_str().to_string()),
            direction: match call.direction {
                CallDirection::Inbound => "inbound".to_string(),
                CallDirection::Outbound => "outbound".to_string(),
            },
            phone_number: call.phone_number.clone(),
            caller_id: call.caller_id.clone(),
            status: call.status.as_db_str().to_string(),
            start_time: call.start_time,
            answer_time: call.answer_time,
            end_time: now,
            ring_duration_ms: call.ring_duration_ms(),
            talk_duration_ms: call.talk_duration_ms(now),
        };

        let repo = CallRepository::new(&self.durable);
        if let Err(e) = repo.insert_terminal(&record).await {
            error!(call_id = %id, error = %e, "durable write failed for terminal call; fast state retained for reaper");
        }

        Ok(Some(call))
    }

    pub async fn update_agent_status(
        &self,
        agent_id: &AgentId,
        tenant_id: &TenantId,
        state: AgentState,
        current_call_id: Option<CallId>,
    ) -> Result<AgentStatusRecord> {
        let record = AgentStatusRecord {
            agent_id: agent_id.clone(),
            tenant_id: tenant_id.clone(),
            state,
            current_call_id,
            last_state_change: Utc::now(),
            calls_handled: match self.fast.get::<AgentStatusRecord>(&agent_key(agent_id)).await? {
                Some(existing) => existing.calls_handled,
                None => 0,
            },
        };

        self.fast.put(&agent_key(agent_id), &record).await?;
        self.fast.set_add(&tenant_agents_key(tenant_id), agent_id.as_str()).await?;
        Ok(record)
    }

    pub async fn get_agent_status(&self, agent_id: &AgentId) -> Result<Option<AgentStatusRecord>> {
        Ok(self.fast.get(&agent_key(agent_id)).await?)
    }

    /// All agents in `available` state for a tenant, sorted by
    /// last-state-change ascending (longest idle first) -- the ordering
    /// progressive matching depends on (§4.4).
    pub async fn get_available_agents(&self, tenant_id: &TenantId) -> Result<Vec<AgentStatusRecord>> {
        let members = self.fast.set_members(&tenant_agents_key(tenant_id)).await?;
        let mut agents = Vec::with_capacity(members.len());
        for agent_id_str in members {
            let agent_id = AgentId::new(agent_id_str);
            if let Some(record) = self.fast.get::<AgentStatusRecord>(&agent_key(&agent_id)).await? {
                if record.state == AgentState::Available {
                    agents.push(record);
                }
            } else {
                warn!(%agent_id, "tenant agent index points at an expired record");
            }
        }
        agents.sort_by(|a, b| {
            a.last_state_change
                .cmp(&b.last_state_change)
                .then_with(|| a.agent_id.as_str().cmp(b.agent_id.as_str()))
        });
        Ok(agents)
    }

    pub async fn active_call_ids(&self) -> Result<Vec<String>> {
        Ok(self.fast.set_members(ACTIVE_CALLS_KEY).await?)
    }

    pub async fn campaign_call_ids(&self, campaign_id: &str) -> Result<Vec<String>> {
        Ok(self.fast.set_members(&campaign_calls_key(campaign_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::CampaignId;

    #[test]
    fn key_layout_matches_operation_table() {
        let call_id = CallId::new("call-1");
        let agent_id = AgentId::new("agent-1");
        let tenant_id = TenantId::new("tenant-1");
        let campaign_id = CampaignId::new("campaign-1");

        assert_eq!(call_key(&call_id), "call:call-1");
        assert_eq!(agent_key(&agent_id), "agent:agent-1");
        assert_eq!(campaign_calls_key(campaign_id.as_str()), "campaign:calls:campaign-1");
        assert_eq!(tenant_agents_key(&tenant_id), "tenant:agents:tenant-1");
    }
}
