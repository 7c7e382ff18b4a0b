//! Watchdog (§7)
//!
//! Periodic sweep reaping calls whose hangup event was lost: `ringing` calls
//! past `ring_timeout + grace`, and `initiated` calls stuck beyond 60s
//! (originate never produced CHANNEL_CREATE).

use std::collections::HashMap;
use std::sync::Arc;

use call_service::{CallService, CallStatus};
use chrono::Utc;
use dialer_core::{CallId, CampaignId};
use dialer_store::{CampaignRepository, CampaignSettings, DurablePool};
use tracing::{info, warn};

use crate::config::WatchdogConfig;
use crate::event_bus::EventPublisher;

pub struct Watchdog {
    config: WatchdogConfig,
    call_service: Arc<CallService>,
    durable: Arc<DurablePool>,
    events: Arc<EventPublisher>,
}

impl Watchdog {
    pub fn spawn(
        config: WatchdogConfig,
        call_service: Arc<CallService>,
        durable: Arc<DurablePool>,
        events: Arc<EventPublisher>,
    ) -> tokio::task::JoinHandle<()> {
        let watchdog = Self { config, call_service, durable, events };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(watchdog.config.sweep_interval_secs));
            loop {
                ticker.tick().await;
                watchdog.sweep().await;
            }
        })
    }

    async fn sweep(&self) {
        let ids = match self.call_service.active_call_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "watchdog failed to list active calls");
                return;
            }
        };

        let mut settings_cache: HashMap<CampaignId, CampaignSettings> = HashMap::new();
        let now = Utc::now();

        for id in ids {
            let call_id = CallId::new(id);
            let call = match self.call_service.get_call(&call_id).await {
                Ok(Some(call)) => call,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, %call_id, "watchdog failed to read call");
                    continue;
                }
            };

            let age = now.signed_duration_since(call.start_time).num_seconds().max(0) as u64;

            let stuck = match call.status {
                CallStatus::Initiated => age >= self.config.initiated_stuck_secs as u64,
                CallStatus::Ringing => {
                    let ring_timeout = match &call.campaign_id {
                        Some(campaign_id) => self.ring_timeout_for(campaign_id, &mut settings_cache).await,
                        None => CampaignSettings::default().ring_timeout_secs,
                    };
                    age >= ring_timeout + self.config.ring_grace_secs
                }
                _ => false,
            };

            if !stuck {
                continue;
            }

            warn!(%call_id, status = ?call.status, age_secs = age, "watchdog reaping stuck call");
            match self.call_service.end_call(&call_id, CallStatus::Failed).await {
                Ok(Some(ended)) => {
                    self.events
                        .publish_ended(
                            call_id.as_str(),
                            ended.tenant_id.as_str(),
                            serde_json::json!({
                                "callId": ended.id.as_str(),
                                "status": CallStatus::Failed.as_db_str(),
                                "reason": "watchdog_reaped",
                            }),
                        )
                        .await;
                    info!(%call_id, "watchdog reaped call");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, %call_id, "watchdog failed to end stuck call"),
            }
        }
    }

    async fn ring_timeout_for(
        &self,
        campaign_id: &CampaignId,
        cache: &mut HashMap<CampaignId, CampaignSettings>,
    ) -> u64 {
        if let Some(settings) = cache.get(campaign_id) {
            return settings.ring_timeout_secs;
        }

        let settings = CampaignRepository::new(&self.durable)
            .find_by_id(campaign_id)
            .await
            .ok()
            .flatten()
            .map(|c| c.settings)
            .unwrap_or_default();

        let timeout = settings.ring_timeout_secs;
        cache.insert(campaign_id.clone(), settings);
        timeout
    }
}
