//! Dialer Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait every dialer-platform process implements
//! - Common identifier types (CallId, CampaignId, LeadId, AgentId, ...)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{DialerError, Result};
pub use service::{
    DependencyStatus, DialerService, HealthStatus, MicroserviceRuntime, ReadinessStatus,
};
