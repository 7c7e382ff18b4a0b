//! Preview Dialer (§4.5)
//!
//! Agent-pull model: an agent requests the next eligible lead, inspects it,
//! then accepts (dial with the agent pre-bound), rejects, or skips. A 1s
//! watcher reaps expired requests, optionally auto-dialing per campaign
//! config.

use std::sync::Arc;
use std::time::Duration;

use call_service::CallService;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dialer_core::{AgentId, CampaignId, LeadId, PreviewId, TenantId};
use dialer_store::{CampaignSettings, DurablePool, LeadRepository, LeadStatus};
use switch_driver::{OriginateParams, SwitchDriver};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::event_bus::EventPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStatus {
    Pending,
    Accepted,
    Rejected,
    Skipped,
    Expired,
}

impl PreviewStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub id: PreviewId,
    pub agent_id: AgentId,
    pub lead_id: LeadId,
    pub phone_number: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PreviewStatus,
}

pub struct PreviewDialer {
    campaign_id: CampaignId,
    tenant_id: TenantId,
    settings: CampaignSettings,
    call_service: Arc<CallService>,
    switch: Arc<dyn SwitchDriver>,
    durable: Arc<DurablePool>,
    events: Arc<EventPublisher>,
    /// At most one pending request per agent (§3 invariant).
    pending_by_agent: DashMap<AgentId, PreviewId>,
    requests: DashMap<PreviewId, PreviewRequest>,
}

impl PreviewDialer {
    pub fn spawn(
        campaign_id: CampaignId,
        tenant_id: TenantId,
        settings: CampaignSettings,
        call_service: Arc<CallService>,
        switch: Arc<dyn SwitchDriver>,
        durable: Arc<DurablePool>,
        events: Arc<EventPublisher>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let dialer = Arc::new(Self {
            campaign_id,
            tenant_id,
            settings,
            call_service,
            switch,
            durable,
            events,
            pending_by_agent: DashMap::new(),
            requests: DashMap::new(),
        });

        let watcher = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                loop {
                    ticker.tick().await;
                    dialer.watcher_tick().await;
                }
            })
        };

        (dialer, vec![watcher])
    }

    pub async fn request_next_lead(&self, agent_id: AgentId) -> Result<PreviewRequest> {
        if self.pending_by_agent.contains_key(&agent_id) {
            return Err(EngineError::Conflict(format!(
                "agent {} already has a pending preview",
                agent_id
            )));
        }

        let leads = LeadRepository::new(&self.durable)
            .next_eligible(&self.campaign_id, self.settings.retry_interval_secs, 1)
            .await?;
        let lead = leads
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NotFound("no eligible leads".to_string()))?;

        let now = Utc::now();
        let request = PreviewRequest {
            id: PreviewId::generate(),
            agent_id: agent_id.clone(),
            lead_id: lead.id,
            phone_number: lead.phone_number,
            requested_at: now,
            expires_at: now + chrono::Duration::seconds(self.settings.preview_time_secs as i64),
            status: PreviewStatus::Pending,
        };

        self.pending_by_agent.insert(agent_id, request.id.clone());
        self.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    pub async fn accept(&self, id: &PreviewId) -> Result<()> {
        let mut request = self.require_pending(id)?;

        if Utc::now() > request.expires_at {
            self.settle(id, PreviewStatus::Expired);
            return Err(EngineError::Conflict("Preview has expired".to_string()));
        }

        self.dial(&mut request).await?;
        self.settle(id, PreviewStatus::Accepted);
        Ok(())
    }

    pub async fn reject(&self, id: &PreviewId, reason: Option<&str>) -> Result<()> {
        let request = self.require_pending(id)?;
        LeadRepository::new(&self.durable)
            .set_status(&request.lead_id, LeadStatus::Rejected, reason)
            .await?;
        self.settle(id, PreviewStatus::Rejected);
        Ok(())
    }

    pub async fn skip(&self, id: &PreviewId) -> Result<()> {
        let request = self.require_pending(id)?;
        LeadRepository::new(&self.durable)
            .record_skip(&request.lead_id, request.agent_id.as_str())
            .await?;
        self.settle(id, PreviewStatus::Skipped);
        Ok(())
    }

    fn require_pending(&self, id: &PreviewId) -> Result<PreviewRequest> {
        let request = self
            .requests
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("preview request {} not found", id)))?
            .clone();

        if request.status != PreviewStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "preview request already {}",
                request.status.label()
            )));
        }
        Ok(request)
    }

    fn settle(&self, id: &PreviewId, status: PreviewStatus) {
        if let Some(mut entry) = self.requests.get_mut(id) {
            entry.status = status;
            self.pending_by_agent.remove(&entry.agent_id);
        }
    }

    async fn dial(&self, request: &mut PreviewRequest) -> Result<()> {
        let input = call_service::CreateCallInput {
            tenant_id: self.tenant_id.clone(),
            direction: call_service::CallDirection::Outbound,
            phone_number: request.phone_number.clone(),
            caller_id: None,
            campaign_id: Some(self.campaign_id.clone()),
            lead_id: Some(request.lead_id.clone()),
            metadata: None,
        };
        let call = self.call_service.create_call(input).await?;

        self.events
            .publish_started(
                call.id.as_str(),
                self.tenant_id.as_str(),
                serde_json::json!({
                    "callId": call.id.as_str(),
                    "campaignId": self.campaign_id.as_str(),
                    "leadId": request.lead_id.as_str(),
                    "agentId": request.agent_id.as_str(),
                    "phoneNumber": call.phone_number,
                    "direction": "outbound",
                }),
            )
            .await;

        self.call_service
            .update_agent_status(
                &request.agent_id,
                &self.tenant_id,
                call_service::AgentState::OnCall,
                Some(call.id.clone()),
            )
            .await?;

        let params = OriginateParams::new(request.phone_number.clone(), "preview")
            .with_var("call-id", call.id.as_str())
            .with_var("campaign-id", self.campaign_id.as_str())
            .with_var("lead-id", request.lead_id.as_str())
            .with_var("tenant-id", self.tenant_id.as_str())
            .with_var("agent-id", request.agent_id.as_str());

        if let Err(e) = self.switch.originate(params).await {
            warn!(error = %e, call_id = %call.id, "preview originate failed; attempt is still recorded");
        }

        LeadRepository::new(&self.durable).record_attempt(&request.lead_id).await?;
        Ok(())
    }

    async fn watcher_tick(&self) {
        let now = Utc::now();
        let expired: Vec<PreviewId> = self
            .requests
            .iter()
            .filter(|e| e.status == PreviewStatus::Pending && now > e.expires_at)
            .map(|e| e.id.clone())
            .collect();

        for id in expired {
            let mut request = match self.requests.get(&id) {
                Some(r) => r.clone(),
                None => continue,
            };

            if self.settings.auto_dial_after_preview {
                match self.dial(&mut request).await {
                    Ok(()) => {
                        info!(preview_id = %id, "preview auto-dialed on expiry");
                        self.settle(&id, PreviewStatus::Accepted);
                    }
                    Err(e) => {
                        warn!(error = %e, preview_id = %id, "auto-dial on expiry failed");
                        self.settle(&id, PreviewStatus::Expired);
                    }
                }
            } else {
                self.settle(&id, PreviewStatus::Expired);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(expires_in_secs: i64) -> PreviewRequest {
        let now = Utc::now();
        PreviewRequest {
            id: PreviewId::generate(),
            agent_id: AgentId::new("agent-1"),
            lead_id: LeadId::generate(),
            phone_number: "+15550000".to_string(),
            requested_at: now,
            expires_at: now + chrono::Duration::seconds(expires_in_secs),
            status: PreviewStatus::Pending,
        }
    }

    #[test]
    fn accept_before_expiry_is_not_expired() {
        // §8 scenario 4: accept at T+5s against a T+30s expiry.
        let request = sample_request(25);
        assert!(Utc::now() <= request.expires_at);
    }

    #[test]
    fn accept_after_expiry_is_expired() {
        // §8 scenario 4: accept at T+31s against a T+30s expiry.
        let request = sample_request(-1);
        assert!(Utc::now() > request.expires_at);
    }

    #[test]
    fn redrive_message_names_the_settled_state() {
        assert_eq!(PreviewStatus::Accepted.label(), "accepted");
        assert_eq!(PreviewStatus::Rejected.label(), "rejected");
        assert_eq!(PreviewStatus::Skipped.label(), "skipped");
        assert_eq!(PreviewStatus::Expired.label(), "expired");
    }
}
