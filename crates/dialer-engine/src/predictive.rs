//! Predictive Dialer (§4.3)
//!
//! A closed-loop pacer. Ticks every second computing a target concurrency
//! from `available_agents * r` and closing the gap with originates; an
//! independent 30s timer nudges `r` toward the configured abandon-rate
//! target using a simple integral controller. Answered calls without an
//! agent bound at originate time queue in the same waiting-for-agent
//! substrate as the Progressive Dialer (§4.4); a call reaped there past the
//! wait cap feeds back into the controller as an abandon.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use call_service::CallService;
use dialer_core::{CallId, CampaignId, TenantId};
use dialer_store::{CampaignSettings, DurablePool, LeadRepository};
use switch_driver::{OriginateParams, SwitchDriver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event_bus::EventPublisher;
use crate::waiting::WaitingQueue;

const WINDOW_CAPACITY: usize = 100;
const MIN_SAMPLES_FOR_ADJUSTMENT: usize = 20;
const DEAD_BAND: f64 = 0.01;
const ADJUSTMENT_GAIN: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    answered: bool,
    abandoned: bool,
}

struct PredictiveState {
    r: f64,
    window: VecDeque<Outcome>,
}

/// Shared handle a running Predictive Dialer gives the Manager: outcome
/// recording, answered-call handoff into the waiting queue, and a snapshot
/// of its current dial ratio for `/campaigns/:id/status`.
pub struct PredictiveDialer {
    campaign_id: CampaignId,
    tenant_id: TenantId,
    settings: CampaignSettings,
    call_service: Arc<CallService>,
    switch: Arc<dyn SwitchDriver>,
    durable: Arc<DurablePool>,
    events: Arc<EventPublisher>,
    waiting: WaitingQueue,
    state: Arc<Mutex<PredictiveState>>,
}

impl PredictiveDialer {
    pub fn spawn(
        campaign_id: CampaignId,
        tenant_id: TenantId,
        settings: CampaignSettings,
        call_service: Arc<CallService>,
        switch: Arc<dyn SwitchDriver>,
        durable: Arc<DurablePool>,
        events: Arc<EventPublisher>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let initial_r = (settings.dial_ratio_min + settings.dial_ratio_max) / 2.0;
        let dialer = Arc::new(Self {
            campaign_id,
            tenant_id,
            settings,
            call_service,
            switch,
            durable,
            events,
            waiting: WaitingQueue::new(),
            state: Arc::new(Mutex::new(PredictiveState {
                r: initial_r,
                window: VecDeque::with_capacity(WINDOW_CAPACITY),
            })),
        });

        let dial_handle = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
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

        let adjust_handle = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(30));
                loop {
                    ticker.tick().await;
                    dialer.adjustment_tick().await;
                }
            })
        };

        (dialer, vec![dial_handle, match_handle, adjust_handle])
    }

    pub async fn current_ratio(&self) -> f64 {
        self.state.lock().await.r
    }

    /// Called by the Manager when a predictive-originated call answers
    /// (§4.6): the call enters the waiting-for-agent queue in insertion
    /// order, same as progressive (§4.4).
    pub async fn on_call_answered(&self, call_id: CallId, phone_number: String, switch_uuid: Option<String>) {
        self.waiting.push(call_id, phone_number, switch_uuid).await;
    }

    /// Appends a call outcome to the rolling window (oldest evicted at
    /// capacity), called by the Manager's hangup handler (§4.6) and by this
    /// dialer's own matching tick when a waiting call is reaped past the
    /// wait-for-agent cap.
    pub async fn record_outcome(&self, answered: bool, abandoned: bool) {
        let mut state = self.state.lock().await;
        if state.window.len() == WINDOW_CAPACITY {
            state.window.pop_front();
        }
        state.window.push_back(Outcome { answered, abandoned });
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

        let r = self.state.lock().await.r;
        let target_calls = (available_agents as f64 * r).ceil() as usize;
        let calls_to_make = target_calls.saturating_sub(calls_in_progress);
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

            let params = OriginateParams::new(lead.phone_number.clone(), "predictive")
                .with_var("call-id", call.id.as_str())
                .with_var("campaign-id", self.campaign_id.as_str())
                .with_var("lead-id", lead.id.as_str())
                .with_var("tenant-id", self.tenant_id.as_str());

            if let Err(e) = self.switch.originate(params).await {
                warn!(error = %e, call_id = %call.id, "originate failed; attempt is still recorded");
            }

            // The attempt was made regardless of originate success (§7).
            if let Err(e) = LeadRepository::new(&self.durable).record_attempt(&lead.id).await {
                warn!(error = %e, lead_id = %lead.id, "failed to record lead attempt");
            }
        }
    }

    async fn matching_tick(&self) {
        let wait_cap = Duration::from_secs(self.settings.wait_for_agent_secs);
        let abandoned = self
            .waiting
            .tick(&self.call_service, &self.switch, &self.events, &self.tenant_id, wait_cap)
            .await;

        for _ in abandoned {
            // The call answered (it was in the queue) but was never bridged
            // to an agent -- exactly the abandon §4.3 defines the controller
            // on.
            self.record_outcome(true, true).await;
        }
    }

    async fn adjustment_tick(&self) {
        let mut state = self.state.lock().await;
        if state.window.len() < MIN_SAMPLES_FOR_ADJUSTMENT {
            return;
        }

        let abandons = state.window.iter().filter(|o| o.abandoned).count();
        let a = abandons as f64 / state.window.len() as f64;
        let a_star = self.settings.abandon_rate_target;

        if (a - a_star).abs() < DEAD_BAND {
            return;
        }

        let delta = -ADJUSTMENT_GAIN * (a - a_star) / a_star;
        let new_r = (state.r + delta).clamp(self.settings.dial_ratio_min, self.settings.dial_ratio_max);

        info!(
            campaign_id = %self.campaign_id,
            old_r = state.r,
            new_r,
            abandon_rate = a,
            "predictive dial ratio adjusted"
        );
        state.r = new_r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_formula_matches_over_abandon_scenario() {
        // §8 scenario 2: a=6%, a*=3% -> delta = -0.1.
        let a = 0.06;
        let a_star = 0.03;
        let delta = -ADJUSTMENT_GAIN * (a - a_star) / a_star;
        assert!((delta - (-0.1)).abs() < 1e-9);

        let new_r = (1.85_f64 + delta).clamp(1.2, 2.5);
        assert!((new_r - 1.75).abs() < 1e-9);
    }

    #[test]
    fn dead_band_suppresses_adjustment_at_target() {
        // §8 scenario 1: a == a* exactly -> no change.
        let a: f64 = 0.03;
        let a_star: f64 = 0.03;
        assert!((a - a_star).abs() < DEAD_BAND);
    }
}
