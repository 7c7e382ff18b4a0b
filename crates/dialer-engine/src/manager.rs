//! Dialer Manager (§4.6)
//!
//! Owns the switch connection, the event publisher, and the
//! `campaign-id -> (Dialer, mode)` map. Dispatches switch events to the
//! right campaign and drives campaign lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use call_service::{AgentState, CallService, CallStatus, UpdateCallPatch};
use dialer_core::{AgentId, CallId, CampaignId, TenantId};
use dialer_store::{CampaignRepository, CampaignStatus, DurablePool};
use switch_driver::{SwitchDriver, SwitchEvent};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::event_bus::EventPublisher;
use crate::predictive::PredictiveDialer;
use crate::preview::PreviewDialer;
use crate::progressive::ProgressiveDialer;

/// A running campaign's dialer plus the handles needed to stop it cleanly.
enum CampaignDialer {
    Predictive(Arc<PredictiveDialer>),
    Progressive(Arc<ProgressiveDialer>),
    Preview(Arc<PreviewDialer>),
}

struct RunningCampaign {
    tenant_id: TenantId,
    dialer: CampaignDialer,
    tasks: Vec<JoinHandle<()>>,
}

pub struct DialerManager {
    switch: Arc<dyn SwitchDriver>,
    call_service: Arc<CallService>,
    durable: Arc<DurablePool>,
    events: Arc<EventPublisher>,
    campaigns: RwLock<HashMap<CampaignId, RunningCampaign>>,
}

impl DialerManager {
    pub fn new(
        switch: Arc<dyn SwitchDriver>,
        call_service: Arc<CallService>,
        durable: Arc<DurablePool>,
        events: Arc<EventPublisher>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            switch,
            call_service,
            durable,
            events,
            campaigns: RwLock::new(HashMap::new()),
        });

        let event_loop_manager = manager.clone();
        tokio::spawn(async move {
            event_loop_manager.run_event_loop().await;
        });

        manager
    }

    async fn run_event_loop(self: Arc<Self>) {
        let mut rx = self.switch.subscribe_events();
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_switch_event(event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "switch event subscriber lagged; events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    warn!("switch event stream closed");
                    break;
                }
            }
        }
    }

    async fn handle_switch_event(&self, event: SwitchEvent) {
        let vars = event.vars().clone();
        let Some(call_id) = vars.call_id() else {
            return;
        };
        let call_id = CallId::new(call_id.to_string());
        let campaign_id = vars.campaign_id().map(|c| CampaignId::new(c.to_string()));

        match event {
            SwitchEvent::ChannelCreate { switch_uuid, .. } => {
                let patch = UpdateCallPatch {
                    status: Some(CallStatus::Ringing),
                    switch_uuid: Some(switch_uuid),
                    agent_id: None,
                };
                if let Err(e) = self.call_service.update_call(&call_id, patch).await {
                    warn!(error = %e, %call_id, "failed to mark call ringing");
                }
            }
            SwitchEvent::ChannelAnswer { switch_uuid, .. } => {
                let agent_id = vars.agent_id().map(|a| AgentId::new(a.to_string()));
                let call = match self.call_service.answer_call(&call_id, agent_id).await {
                    Ok(call) => call,
                    Err(e) => {
                        warn!(error = %e, %call_id, "failed to mark call answered");
                        return;
                    }
                };
                let Some(call) = call else { return };

                self.events
                    .publish_answered(
                        call_id.as_str(),
                        call.tenant_id.as_str(),
                        serde_json::json!({
                            "callId": call.id.as_str(),
                            "campaignId": campaign_id.as_ref().map(|c| c.as_str()),
                            "answerTime": call.answer_time,
                        }),
                    )
                    .await;

                if let Some(campaign_id) = &campaign_id {
                    let campaigns = self.campaigns.read().await;
                    if let Some(running) = campaigns.get(campaign_id) {
                        match &running.dialer {
                            CampaignDialer::Progressive(dialer) => {
                                dialer
                                    .on_call_answered(call.id.clone(), call.phone_number.clone(), Some(switch_uuid))
                                    .await;
                            }
                            CampaignDialer::Predictive(dialer) => {
                                dialer
                                    .on_call_answered(call.id.clone(), call.phone_number.clone(), Some(switch_uuid))
                                    .await;
                            }
                            CampaignDialer::Preview(_) => {}
                        }
                    }
                }
            }
            SwitchEvent::ChannelHangupComplete { cause, .. } => {
                let status = map_hangup_cause(&cause);
                let call = match self.call_service.end_call(&call_id, status).await {
                    Ok(call) => call,
                    Err(e) => {
                        warn!(error = %e, %call_id, "failed to end call");
                        return;
                    }
                };
                let Some(call) = call else { return };

                self.events
                    .publish_ended(
                        call_id.as_str(),
                        call.tenant_id.as_str(),
                        serde_json::json!({
                            "callId": call.id.as_str(),
                            "campaignId": campaign_id.as_ref().map(|c| c.as_str()),
                            "status": status.as_db_str(),
                            "endTime": call.end_time,
                            "ringDurationMs": call.ring_duration_ms(),
                        }),
                    )
                    .await;

                if let Some(agent_id) = &call.agent_id {
                    if let Err(e) = self
                        .call_service
                        .update_agent_status(agent_id, &call.tenant_id, AgentState::WrapUp, None)
                        .await
                    {
                        warn!(error = %e, %agent_id, "failed to transition agent to wrap-up");
                    }
                }

                if let Some(campaign_id) = &campaign_id {
                    let campaigns = self.campaigns.read().await;
                    if let Some(running) = campaigns.get(campaign_id) {
                        if let CampaignDialer::Predictive(dialer) = &running.dialer {
                            let answered = call.answer_time.is_some();
                            let abandoned = status == CallStatus::Abandoned;
                            dialer.record_outcome(answered, abandoned).await;
                        }
                    }
                }
            }
        }
    }

    /// Loads the campaign row, rejects non-active campaigns, and spawns the
    /// appropriate Dialer. A no-op if the campaign is already registered.
    pub async fn start_campaign(&self, campaign_id: &CampaignId) -> Result<()> {
        if self.campaigns.read().await.contains_key(campaign_id) {
            return Ok(());
        }

        let campaign = CampaignRepository::new(&self.durable)
            .find_by_id(campaign_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("campaign {} not found", campaign_id)))?;

        if campaign.status != CampaignStatus::Active {
            return Err(EngineError::UnsupportedMode(campaign_id.as_str().to_string()));
        }

        let (dialer, tasks) = match campaign.mode {
            dialer_store::DialMode::Predictive => {
                let (d, t) = PredictiveDialer::spawn(
                    campaign_id.clone(),
                    campaign.tenant_id.clone(),
                    campaign.settings,
                    self.call_service.clone(),
                    self.switch.clone(),
                    self.durable.clone(),
                    self.events.clone(),
                );
                (CampaignDialer::Predictive(d), t)
            }
            dialer_store::DialMode::Progressive => {
                let (d, t) = ProgressiveDialer::spawn(
                    campaign_id.clone(),
                    campaign.tenant_id.clone(),
                    campaign.settings,
                    self.call_service.clone(),
                    self.switch.clone(),
                    self.durable.clone(),
                    self.events.clone(),
                );
                (CampaignDialer::Progressive(d), t)
            }
            dialer_store::DialMode::Preview => {
                let (d, t) = PreviewDialer::spawn(
                    campaign_id.clone(),
                    campaign.tenant_id.clone(),
                    campaign.settings,
                    self.call_service.clone(),
                    self.switch.clone(),
                    self.durable.clone(),
                    self.events.clone(),
                );
                (CampaignDialer::Preview(d), t)
            }
        };

        self.campaigns.write().await.insert(
            campaign_id.clone(),
            RunningCampaign { tenant_id: campaign.tenant_id, dialer, tasks },
        );

        info!(%campaign_id, mode = campaign.mode.as_db_str(), "campaign started");
        Ok(())
    }

    /// Stops ticking immediately; in-flight calls drain naturally through
    /// switch events (§5).
    pub async fn stop_campaign(&self, campaign_id: &CampaignId) -> Result<()> {
        let running = self.campaigns.write().await.remove(campaign_id);
        match running {
            Some(running) => {
                for task in running.tasks {
                    task.abort();
                }
                info!(%campaign_id, "campaign stopped");
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("campaign {} is not running", campaign_id))),
        }
    }

    pub async fn active_campaign_ids(&self) -> Vec<CampaignId> {
        self.campaigns.read().await.keys().cloned().collect()
    }

    pub async fn campaign_status(&self, campaign_id: &CampaignId) -> Option<(String, Option<f64>)> {
        let campaigns = self.campaigns.read().await;
        let running = campaigns.get(campaign_id)?;
        let mode = match &running.dialer {
            CampaignDialer::Predictive(d) => ("predictive".to_string(), Some(d.current_ratio().await)),
            CampaignDialer::Progressive(_) => ("progressive".to_string(), None),
            CampaignDialer::Preview(_) => ("preview".to_string(), None),
        };
        Some(mode)
    }

    pub async fn preview_dialer(&self, campaign_id: &CampaignId) -> Option<Arc<PreviewDialer>> {
        let campaigns = self.campaigns.read().await;
        match &campaigns.get(campaign_id)?.dialer {
            CampaignDialer::Preview(d) => Some(d.clone()),
            _ => None,
        }
    }

    pub async fn tenant_for(&self, campaign_id: &CampaignId) -> Option<TenantId> {
        self.campaigns.read().await.get(campaign_id).map(|r| r.tenant_id.clone())
    }

    /// Stops every running campaign. The switch socket itself is not
    /// explicitly closed -- `EslSwitchDriver` exposes no disconnect; process
    /// exit tears down the connection.
    pub async fn shutdown(&self) {
        let mut campaigns = self.campaigns.write().await;
        for (campaign_id, running) in campaigns.drain() {
            for task in running.tasks {
                task.abort();
            }
            info!(%campaign_id, "campaign stopped for shutdown");
        }
    }
}

/// §4.6's hangup-cause table.
fn map_hangup_cause(cause: &str) -> CallStatus {
    match cause {
        "NO_ANSWER" | "NO_USER_RESPONSE" => CallStatus::NoAnswer,
        "USER_BUSY" | "CALL_REJECTED" => CallStatus::Busy,
        "ORIGINATOR_CANCEL" | "LOSE_RACE" => CallStatus::Abandoned,
        "NORMAL_CLEARING" | "SUCCESS" => CallStatus::Completed,
        _ => CallStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hangup_cause_table_matches_spec() {
        assert_eq!(map_hangup_cause("NO_ANSWER"), CallStatus::NoAnswer);
        assert_eq!(map_hangup_cause("NO_USER_RESPONSE"), CallStatus::NoAnswer);
        assert_eq!(map_hangup_cause("USER_BUSY"), CallStatus::Busy);
        assert_eq!(map_hangup_cause("CALL_REJECTED"), CallStatus::Busy);
        assert_eq!(map_hangup_cause("ORIGINATOR_CANCEL"), CallStatus::Abandoned);
        assert_eq!(map_hangup_cause("LOSE_RACE"), CallStatus::Abandoned);
        assert_eq!(map_hangup_cause("NORMAL_CLEARING"), CallStatus::Completed);
        assert_eq!(map_hangup_cause("SUCCESS"), CallStatus::Completed);
        assert_eq!(map_hangup_cause("SOME_WEIRD_CAUSE"), CallStatus::Failed);
    }

    #[test]
    fn unsupported_mode_message_matches_spec_wording() {
        // §8 scenario 6: starting a draft campaign returns 500 "Campaign {id} is not active".
        let err = EngineError::UnsupportedMode("camp-1".to_string());
        assert_eq!(err.to_string(), "Campaign camp-1 is not active");
    }
}
