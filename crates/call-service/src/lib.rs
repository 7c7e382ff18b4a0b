//! Call Service
//!
//! Two-tier storage for live call and agent state (§4.2): a Redis-backed
//! fast path with a 24h TTL for everything in flight, and a durable Postgres
//! row written once a call reaches a terminal status.

mod error;
mod service;
mod types;

pub use error::{CallServiceError, Result};
pub use service::CallService;
pub use types::{
    AgentState, AgentStatusRecord, Call, CallDirection, CallStatus, CreateCallInput, UpdateCallPatch,
};
