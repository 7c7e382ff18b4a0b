//! Inbound event stream from the media switch (§4.1)

use std::collections::HashMap;

/// Channel variables echoed on every event for a channel: the correlation set
/// attached at originate time.
#[derive(Debug, Clone, Default)]
pub struct ChannelVars(pub HashMap<String, String>);

impl ChannelVars {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.get("call-id")
    }

    pub fn campaign_id(&self) -> Option<&str> {
        self.get("campaign-id")
    }

    pub fn lead_id(&self) -> Option<&str> {
        self.get("lead-id")
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.get("tenant-id")
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.get("agent-id")
    }
}

#[derive(Debug, Clone)]
pub enum SwitchEvent {
    ChannelCreate {
        switch_uuid: String,
        vars: ChannelVars,
    },
    ChannelAnswer {
        switch_uuid: String,
        vars: ChannelVars,
    },
    ChannelHangupComplete {
        switch_uuid: String,
        cause: String,
        vars: ChannelVars,
    },
}

impl SwitchEvent {
    pub fn switch_uuid(&self) -> &str {
        match self {
            Self::ChannelCreate { switch_uuid, .. }
            | Self::ChannelAnswer { switch_uuid, .. }
            | Self::ChannelHangupComplete { switch_uuid, .. } => switch_uuid,
        }
    }

    pub fn vars(&self) -> &ChannelVars {
        match self {
            Self::ChannelCreate { vars, .. }
            | Self::ChannelAnswer { vars, .. }
            | Self::ChannelHangupComplete { vars, .. } => vars,
        }
    }
}
