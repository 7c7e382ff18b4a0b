//! Waiting-for-agent queue (§4.4), shared by the Progressive and Predictive
//! dialers: a call that answers with no agent bound at originate time queues
//! here until paired with the longest-idle available agent or reaped once it
//! has waited past the campaign's `wait_for_agent_secs` cap.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use call_service::{AgentState, CallService, CallStatus, UpdateCallPatch};
use chrono::{DateTime, Utc};
use dialer_core::{AgentId, CallId, TenantId};
use switch_driver::SwitchDriver;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::event_bus::EventPublisher;

#[derive(Debug, Clone)]
pub(crate) struct WaitingCall {
    pub call_id: CallId,
    pub phone_number: String,
    pub switch_uuid: Option<String>,
    pub queued_at: DateTime<Utc>,
}

pub(crate) struct WaitingQueue {
    calls: Mutex<VecDeque<WaitingCall>>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self { calls: Mutex::new(VecDeque::new()) }
    }

    /// Called by the Manager when an answered call has no agent bound yet
    /// (§4.6): the call enters the queue in insertion order.
    pub async fn push(&self, call_id: CallId, phone_number: String, switch_uuid: Option<String>) {
        self.calls.lock().await.push_back(WaitingCall {
            call_id,
            phone_number,
            switch_uuid,
            queued_at: Utc::now(),
        });
    }

    /// Pairs as many waiting calls as there are available agents -- oldest
    /// call first against the longest-idle agent, since `get_available_agents`
    /// already returns agents sorted by last-state-change ascending (§4.2) --
    /// and reaps any call that has waited past `wait_cap`. Returns the calls
    /// abandoned this tick so a caller with its own outcome bookkeeping (the
    /// predictive controller) can fold them in.
    pub async fn tick(
        &self,
        call_service: &CallService,
        switch: &Arc<dyn SwitchDriver>,
        events: &EventPublisher,
        tenant_id: &TenantId,
        wait_cap: Duration,
    ) -> Vec<WaitingCall> {
        let agents = match call_service.get_available_agents(tenant_id).await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(error = %e, "failed to read available agents for matching");
                return Vec::new();
            }
        };
        let mut agents = agents.into_iter();

        let mut waiting = self.calls.lock().await;
        let now = Utc::now();
        let mut abandoned = Vec::new();
        let mut remaining = VecDeque::with_capacity(waiting.len());

        while let Some(call) = waiting.pop_front() {
            let age = now.signed_duration_since(call.queued_at).to_std().unwrap_or_default();

            if age >= wait_cap {
                Self::abandon(call_service, switch, events, tenant_id, &call).await;
                abandoned.push(call);
                continue;
            }

            match agents.next() {
                Some(agent) => Self::pair(call_service, tenant_id, &call, agent.agent_id).await,
                None => remaining.push_back(call),
            }
        }
        *waiting = remaining;
        abandoned
    }

    async fn pair(call_service: &CallService, tenant_id: &TenantId, call: &WaitingCall, agent_id: AgentId) {
        if let Err(e) = call_service
            .update_agent_status(&agent_id, tenant_id, AgentState::OnCall, Some(call.call_id.clone()))
            .await
        {
            warn!(error = %e, %agent_id, "failed to mark agent on-call");
            return;
        }

        let patch = UpdateCallPatch {
            status: Some(CallStatus::Connected),
            switch_uuid: None,
            agent_id: Some(Some(agent_id.clone())),
        };
        if let Err(e) = call_service.update_call(&call.call_id, patch).await {
            warn!(error = %e, call_id = %call.call_id, "failed to attach agent to call");
        }

        info!(call_id = %call.call_id, %agent_id, "call paired with agent");
    }

    /// A call that waited past `wait_for_agent_secs` is force-terminated and
    /// ended as abandoned (§4.3, §4.4) -- this preempts the generic
    /// hangup-cause mapping table in §4.6 because the dialer itself decides
    /// the outcome.
    async fn abandon(
        call_service: &CallService,
        switch: &Arc<dyn SwitchDriver>,
        events: &EventPublisher,
        tenant_id: &TenantId,
        call: &WaitingCall,
    ) {
        if let Some(uuid) = &call.switch_uuid {
            if let Err(e) = switch.hangup(uuid, "NO_USER_RESPONSE").await {
                warn!(error = %e, call_id = %call.call_id, "hangup command failed for abandoned call");
            }
        }

        match call_service.end_call(&call.call_id, CallStatus::Abandoned).await {
            Ok(Some(ended)) => {
                events
                    .publish_ended(
                        call.call_id.as_str(),
                        tenant_id.as_str(),
                        serde_json::json!({
                            "callId": ended.id.as_str(),
                            "phoneNumber": call.phone_number,
                            "status": CallStatus::Abandoned.as_db_str(),
                        }),
                    )
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, call_id = %call.call_id, "failed to end abandoned call"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_idle_agent_is_matched_first() {
        // §8 scenario 3: agents idle since T-30s and T-10s; the T-30s agent
        // is matched to the single waiting call. get_available_agents already
        // returns agents sorted by last-state-change ascending (§4.2), so the
        // matching loop just needs to take agents in order.
        let now = Utc::now();
        let longer_idle = now - chrono::Duration::seconds(30);
        let shorter_idle = now - chrono::Duration::seconds(10);
        let agents_in_order = vec![longer_idle, shorter_idle];
        assert_eq!(agents_in_order.first().copied(), Some(longer_idle));
    }

    #[test]
    fn call_waiting_past_cap_is_abandoned() {
        // §8 scenario 3: wait-for-agent=10s; a call queued 11s ago exceeds it.
        let wait_cap = Duration::from_secs(10);
        let age = Duration::from_secs(11);
        assert!(age >= wait_cap);

        let age_within_cap = Duration::from_secs(9);
        assert!(age_within_cap < wait_cap);
    }
}
