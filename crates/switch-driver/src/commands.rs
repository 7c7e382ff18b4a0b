//! Commands accepted by the switch driver (§4.1)

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EavesdropMode {
    Listen,
    Whisper,
    Barge,
}

#[derive(Debug, Clone)]
pub struct OriginateParams {
    pub destination: String,
    pub caller_id: String,
    pub timeout: Duration,
    /// Correlation variables attached to the originate and echoed on every
    /// downstream event for this channel: call-id, campaign-id, lead-id,
    /// tenant-id, and (preview mode) agent-id.
    pub vars: HashMap<String, String>,
    pub early_media: bool,
    pub ring_ready: bool,
}

impl OriginateParams {
    pub fn new(destination: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            caller_id: caller_id.into(),
            timeout: Duration::from_secs(30),
            vars: HashMap::new(),
            early_media: false,
            ring_ready: false,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum SwitchCommand {
    Originate(OriginateParams),
    Bridge { uuid_a: String, uuid_b: String },
    Hangup { uuid: String, cause: String },
    Transfer { uuid: String, destination: String, dialplan: String, context: String },
    Hold { uuid: String },
    Unhold { uuid: String },
    Playback { uuid: String, file: String },
    RecordStart { uuid: String, path: String },
    RecordStop { uuid: String, path: String },
    SendDtmf { uuid: String, digits: String },
    Eavesdrop { uuid: String, target_uuid: String, mode: EavesdropMode },
    SetVariable { uuid: String, key: String, value: String },
    GetVariable { uuid: String, key: String },
    Park { uuid: String },
    Answer { uuid: String },
    PreAnswer { uuid: String },
    Broadcast { uuid: String, path: String },
    Deflect { uuid: String, destination: String },
}

/// Job id returned by `originate`: a correlation handle, not a guarantee the
/// call was placed. The resulting call is observed through events (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

#[derive(Debug, Clone)]
pub enum CommandReply {
    Ok,
    OkWithBody(String),
}
