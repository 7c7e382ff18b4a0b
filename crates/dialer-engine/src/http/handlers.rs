//! Request/response shapes and handler bodies for the control HTTP surface (§6).

use axum::extract::{Path, Query, State};
use axum::Json;
use call_service::{AgentState, Call};
use dialer_core::{AgentId, CallId, CampaignId, PreviewId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{EngineError, Result};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

// ---- /health ----

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---- /campaigns/* ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignIdBody {
    pub campaign_id: String,
}

pub async fn start_campaign(
    State(state): State<AppState>,
    Json(body): Json<CampaignIdBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let campaign_id = CampaignId::new(body.campaign_id);
    state.manager.start_campaign(&campaign_id).await?;
    Ok(ok(json!({ "campaignId": campaign_id.as_str() })))
}

pub async fn stop_campaign(
    State(state): State<AppState>,
    Json(body): Json<CampaignIdBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let campaign_id = CampaignId::new(body.campaign_id);
    state.manager.stop_campaign(&campaign_id).await?;
    Ok(ok(json!({ "campaignId": campaign_id.as_str() })))
}

pub async fn active_campaigns(State(state): State<AppState>) -> Json<Envelope<Vec<String>>> {
    let ids = state.manager.active_campaign_ids().await;
    ok(ids.into_iter().map(|id| id.as_str().to_string()).collect())
}

pub async fn campaign_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let campaign_id = CampaignId::new(id);
    let (mode, dial_ratio) = state
        .manager
        .campaign_status(&campaign_id)
        .await
        .ok_or_else(|| EngineError::NotFound(format!("campaign {} is not running", campaign_id)))?;

    Ok(ok(json!({
        "campaignId": campaign_id.as_str(),
        "mode": mode,
        "currentDialRatio": dial_ratio,
    })))
}

// ---- /preview/* ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequestBody {
    pub campaign_id: String,
    pub agent_id: String,
}

pub async fn preview_request(
    State(state): State<AppState>,
    Json(body): Json<PreviewRequestBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let campaign_id = CampaignId::new(body.campaign_id);
    let dialer = state
        .manager
        .preview_dialer(&campaign_id)
        .await
        .ok_or_else(|| EngineError::NotFound(format!("campaign {} has no running preview dialer", campaign_id)))?;

    let request = dialer.request_next_lead(AgentId::new(body.agent_id)).await?;
    Ok(ok(json!({
        "previewId": request.id.as_str(),
        "leadId": request.lead_id.as_str(),
        "phoneNumber": request.phone_number,
        "expiresAt": request.expires_at,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewActionBody {
    pub campaign_id: String,
    pub preview_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn resolve_preview(
    state: &AppState,
    campaign_id: &str,
) -> Result<std::sync::Arc<crate::preview::PreviewDialer>> {
    let campaign_id = CampaignId::new(campaign_id.to_string());
    state
        .manager
        .preview_dialer(&campaign_id)
        .await
        .ok_or_else(|| EngineError::NotFound(format!("campaign {} has no running preview dialer", campaign_id)))
}

pub async fn preview_accept(
    State(state): State<AppState>,
    Json(body): Json<PreviewActionBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let dialer = resolve_preview(&state, &body.campaign_id).await?;
    dialer.accept(&PreviewId::new(body.preview_id.clone())).await?;
    Ok(ok(json!({ "previewId": body.preview_id, "status": "accepted" })))
}

pub async fn preview_reject(
    State(state): State<AppState>,
    Json(body): Json<PreviewActionBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let dialer = resolve_preview(&state, &body.campaign_id).await?;
    dialer
        .reject(&PreviewId::new(body.preview_id.clone()), body.reason.as_deref())
        .await?;
    Ok(ok(json!({ "previewId": body.preview_id, "status": "rejected" })))
}

pub async fn preview_skip(
    State(state): State<AppState>,
    Json(body): Json<PreviewActionBody>,
) -> Result<Json<Envelope<serde_json::Value>>> {
    let dialer = resolve_preview(&state, &body.campaign_id).await?;
    dialer.skip(&PreviewId::new(body.preview_id.clone())).await?;
    Ok(ok(json!({ "previewId": body.preview_id, "status": "skipped" })))
}

// ---- /calls/* ----

pub async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Call>>> {
    let call = state
        .call_service
        .get_call(&CallId::new(id.clone()))
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("call {} not found", id)))?;
    Ok(ok(call))
}

pub async fn active_calls(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Call>>>> {
    let ids = state.call_service.active_call_ids().await?;
    let mut calls = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(call) = state.call_service.get_call(&CallId::new(id)).await? {
            calls.push(call);
        }
    }
    Ok(ok(calls))
}

pub async fn campaign_calls(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<Call>>>> {
    let ids = state.call_service.campaign_call_ids(&id).await?;
    let mut calls = Vec::with_capacity(ids.len());
    for call_id in ids {
        if let Some(call) = state.call_service.get_call(&CallId::new(call_id)).await? {
            calls.push(call);
        }
    }
    Ok(ok(calls))
}

// ---- /agents/* ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusBody {
    pub agent_id: String,
    pub tenant_id: String,
    pub state: String,
    #[serde(default)]
    pub current_call_id: Option<String>,
}

fn parse_agent_state(s: &str) -> Result<AgentState> {
    match s {
        "available" => Ok(AgentState::Available),
        "on_call" => Ok(AgentState::OnCall),
        "wrap_up" => Ok(AgentState::WrapUp),
        "break" => Ok(AgentState::Break),
        "offline" => Ok(AgentState::Offline),
        other => Err(EngineError::Validation(format!("unknown agent state: {}", other))),
    }
}

pub async fn update_agent_status(
    State(state): State<AppState>,
    Json(body): Json<AgentStatusBody>,
) -> Result<Json<Envelope<call_service::AgentStatusRecord>>> {
    let agent_state = parse_agent_state(&body.state)?;
    let record = state
        .call_service
        .update_agent_status(
            &AgentId::new(body.agent_id),
            &TenantId::new(body.tenant_id),
            agent_state,
            body.current_call_id.map(CallId::new),
        )
        .await?;
    Ok(ok(record))
}

pub async fn get_agent_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<call_service::AgentStatusRecord>>> {
    let record = state
        .call_service
        .get_agent_status(&AgentId::new(id.clone()))
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("agent {} not found", id)))?;
    Ok(ok(record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuery {
    pub tenant_id: String,
}

pub async fn available_agents(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Envelope<Vec<call_service::AgentStatusRecord>>>> {
    let agents = state
        .call_service
        .get_available_agents(&TenantId::new(query.tenant_id))
        .await?;
    Ok(ok(agents))
}
