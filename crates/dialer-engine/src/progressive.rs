//! Progressive Dialer (§4.4)
//!
//! One call per idle agent. A 2s dial loop keeps concurrency at
//! `available_agents * 1`; a separate 1s matching loop pairs answered calls
//! with the longest-idle available agent, and reaps calls that wait past the
//! campaign's wait-for-agent cap.

use std::sync::Arc;
use std::time::Duration;

use call_service::CallService;
use dialer_core::{CallId, CampaignId, TenantId};
use dialer_store::{CampaignSettings, DurablePool, LeadRepository};
use switch_driver::{OriginateParams, SwitchDriver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event_bus::EventPublisher;
use crate::waiting::WaitingQueue;

pub struct ProgressiveDialer {
    campaign_id: CampaignId,
    tenant_id: TenantId,
    settings: CampaignSettings,
    call_service: Arc<CallService>,
    switch: Arc<dyn SwitchDriver>,
    durable: Arc<DurablePool>,
    events: Arc<EventPublisher>,
    waiting: WaitingQueue,
}

impl ProgressiveDialer {
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
            waiting: WaitingQueue::new(),
        });

        let dial_handle = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(2));
                loop {
                    ticker.tick().await;
                    dialer.dial_tick().await;
                }
            })
        };

        let match_handle = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                loop {
                    ticker.tick().await;
                    dialer.matching_tick().await;
                }
            })
        };

        (dialer, vec![dial_handle, match_handle])
    }

    /// Called by the Manager when a progressive-originated call answers
    /// (§4.6): the call enters the waiting-for-agent queue in insertion order.
    pub async fn on_call_answered(&self, call_id: CallId, phone_number: String, switch_uuid: Option<String>) {
        self.waiting.push(call_id, phone_number, switch_uuid).await;
    }

    async fn dial_tick(&self) {
        let available_agents = match self.call_service.get_available_agents(&self.tenant_id).await {
            Ok(agents) => agents.len(),
            Err(e) => {
                warn!(error = %e, "failed to read available agents");
                return;
            }
        };

        let calls_in_progress = match self.call_service.campaign_call_ids(self.campaign_id.as_str()).await {
            Ok(calls) => calls.len(),
            Err(e) => {
                warn!(error = %e, "failed to read in-progress call count");
                return;
            }
        };

        let calls_to_make = available_agents.saturating_sub(calls_in_progress);
        if calls_to_make == 0 {
            return;
        }

        let leads = LeadRepository::new(&self.durable)
            .next_eligible(&self.campaign_id, self.settings.retry_interval_secs, calls_to_make as i64)
            .await;
        let leads = match leads {
            Ok(leads) => leads,
            Err(e) => {
                warn!(error = %e, "failed to fetch eligible leads");
                return;
            }
        };

        if leads.is_empty() {
            debug!(campaign_id = %self.campaign_id, "no eligible leads this tick");
            return;
        }

        for lead in leads {
            let input = call_service::CreateCallInput {
                tenant_id: self.tenant_id.clone(),
                direction: call_service::CallDirection::Outbound,
                phone_number: lead.phone_number.clone(),
                caller_id: None,
                campaign_id: Some(self.campaign_id.clone()),
                lead_id: Some(lead.id.clone()),
                metadata: None,
            };

            let call = match self.call_service.create_call(input).await {
                Ok(call) => call,
                Err(e) => {
                    warn!(error = %e, "failed to create call row");
                    continue;
                }
            };

            self.events
                .publish_started(
                    call.id.as_str(),
                    self.tenant_id.as_str(),
                    serde_json::json!({
                        "callId": call.id.as_str(),
                        "campaignId": self.campaign_id.as_str(),
                        "leadId": lead.id.as_str(),
                        "phoneNumber": call.phone_number,
                        "direction": "outbound",
                    }),
                )
                .await;

            // No agent binding at originate time (§4.4); matching happens
            // after the call answers.
            let params = OriginateParams::new(lead.phone_number.clone(), "progressive")
                .with_var("call-id", call.id.as_str())
                .with_var("campaign-id", self.campaign_id.as_str())
                .with_var("lead-id", lead.id.as_str())
                .with_var("tenant-id", self.tenant_id.as_str());

            if let Err(e) = self.switch.originate(params).await {
                warn!(error = %e, call_id = %call.id, "originate failed; attempt is still recorded");
            }

            if let Err(e) = LeadRepository::new(&self.durable).record_attempt(&lead.id).await {
                warn!(error = %e, lead_id = %lead.id, "failed to record lead attempt");
            }
        }
    }

    async fn matching_tick(&self) {
        let wait_cap = Duration::from_secs(self.settings.wait_for_agent_secs);
        self.waiting
            .tick(&self.call_service, &self.switch, &self.events, &self.tenant_id, wait_cap)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_cap_matches_settings() {
        let settings = CampaignSettings { wait_for_agent_secs: 15, ..CampaignSettings::default() };
        assert_eq!(Duration::from_secs(settings.wait_for_agent_secs), Duration::from_secs(15));
    }
}
