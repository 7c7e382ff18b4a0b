//! Switch Driver
//!
//! Maintains one long-lived, authenticated connection to the media switch
//! (§4.1). Exposes a command surface (originate/bridge/hangup/...) and an
//! inbound event stream, reconnecting with exponential backoff on loss.

mod circuit_breaker;
mod commands;
mod config;
mod connection;
mod driver;
mod error;
mod events;

pub use commands::{CommandReply, EavesdropMode, JobId, OriginateParams, SwitchCommand};
pub use config::SwitchConfig;
pub use connection::{ConnectionState, ReconnectPolicy};
pub use driver::{EslSwitchDriver, SwitchDriver};
pub use error::{Result, SwitchError};
pub use events::{ChannelVars, SwitchEvent};
