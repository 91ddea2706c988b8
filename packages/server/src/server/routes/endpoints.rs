//! Endpoint management routes (§6 "create/update/archive endpoints;
//! pause/resume; clear hints"). Creation validates the §3 invariants and
//! tier floor before the first `nextRunAt` is computed; everything else
//! is a thin pass-through to `BaseEndpointStore`.

use axum::extract::{Extension, Path, Query};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::common::{CoreError, EndpointId, JobId};
use crate::domain::{Endpoint, HttpMethod};
use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::store::types::{EndpointPatch, NewEndpoint};

#[derive(Deserialize)]
pub struct CreateEndpointRequest {
    pub job_id: JobId,
    pub name: String,
    pub description: Option<String>,
    pub baseline_cron: Option<String>,
    pub baseline_interval_ms: Option<i64>,
    pub min_interval_ms: Option<i64>,
    pub max_interval_ms: Option<i64>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<serde_json::Value>,
    pub body: Option<serde_json::Value>,
    pub timeout_ms: Option<i64>,
    pub max_execution_time_ms: Option<i64>,
    pub max_response_size_kb: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct UpdateEndpointRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_opt_string")]
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    #[serde(default, deserialize_with = "double_opt_value")]
    pub headers: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "double_opt_value")]
    pub body: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "double_opt_i64")]
    pub timeout_ms: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_opt_i64")]
    pub max_execution_time_ms: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_opt_i64")]
    pub max_response_size_kb: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_opt_i64")]
    pub min_interval_ms: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_opt_i64")]
    pub max_interval_ms: Option<Option<i64>>,
}

fn double_opt_string<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(d)?))
}

fn double_opt_value<'de, D>(d: D) -> Result<Option<Option<serde_json::Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(d)?))
}

fn double_opt_i64<'de, D>(d: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(d)?))
}

#[derive(Deserialize)]
pub struct PauseRequest {
    pub until: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct ListEndpointsQuery {
    pub job_id: JobId,
}

async fn create_endpoint(
    Extension(state): Extension<AppState>,
    Json(req): Json<CreateEndpointRequest>,
) -> ApiResult<Json<Endpoint>> {
    let tenant_id = state
        .job_store
        .get_job(req.job_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("job")))?
        .user_id;
    let tier = state.endpoint_store.get_user_tier(tenant_id).await?;

    Endpoint::validate_new(
        &req.baseline_cron,
        &req.baseline_interval_ms,
        &req.min_interval_ms,
        &req.max_interval_ms,
        tier,
    )
    .map_err(ApiError)?;

    let active_count = state.endpoint_store.count_active_endpoints_by_user(tenant_id).await?;
    if active_count >= tier.limits().max_endpoints {
        return Err(ApiError(CoreError::QuotaExceeded(
            "max endpoints for tier exceeded".into(),
        )));
    }

    let now = Utc::now();
    let next_run_at = if let Some(expr) = &req.baseline_cron {
        crate::cron::next(expr, now).map_err(|e| ApiError(CoreError::validation(e.to_string())))?
    } else {
        now + chrono::Duration::milliseconds(req.baseline_interval_ms.unwrap_or(60_000))
    };

    let endpoint = state
        .endpoint_store
        .create_endpoint(NewEndpoint {
            job_id: req.job_id,
            tenant_id,
            name: req.name,
            description: req.description,
            baseline_cron: req.baseline_cron,
            baseline_interval_ms: req.baseline_interval_ms,
            min_interval_ms: req.min_interval_ms,
            max_interval_ms: req.max_interval_ms,
            url: req.url,
            method: req.method,
            headers: req.headers,
            body: req.body,
            timeout_ms: req.timeout_ms,
            max_execution_time_ms: req.max_execution_time_ms,
            max_response_size_kb: req.max_response_size_kb,
            next_run_at,
        })
        .await?;
    Ok(Json(endpoint))
}

async fn list_endpoints(
    Extension(state): Extension<AppState>,
    Query(q): Query<ListEndpointsQuery>,
) -> ApiResult<Json<Vec<Endpoint>>> {
    let endpoints = state.endpoint_store.list_endpoints_by_job(q.job_id).await?;
    Ok(Json(endpoints))
}

async fn get_endpoint(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<Endpoint>> {
    let endpoint = state
        .endpoint_store
        .get_endpoint(id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("endpoint")))?;
    Ok(Json(endpoint))
}

async fn update_endpoint(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
    Json(req): Json<UpdateEndpointRequest>,
) -> ApiResult<Json<Endpoint>> {
    let endpoint = state
        .endpoint_store
        .update_endpoint(
            id,
            EndpointPatch {
                name: req.name,
                description: req.description,
                url: req.url,
                method: req.method,
                headers: req.headers,
                body: req.body,
                timeout_ms: req.timeout_ms,
                max_execution_time_ms: req.max_execution_time_ms,
                max_response_size_kb: req.max_response_size_kb,
                min_interval_ms: req.min_interval_ms,
                max_interval_ms: req.max_interval_ms,
            },
        )
        .await?;
    Ok(Json(endpoint))
}

async fn archive_endpoint(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<()> {
    state.endpoint_store.archive_endpoint(id, Utc::now()).await?;
    Ok(())
}

async fn pause_endpoint(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
    Json(req): Json<PauseRequest>,
) -> ApiResult<()> {
    state
        .endpoint_store
        .set_paused_until(id, Some(req.until))
        .await?;
    Ok(())
}

async fn resume_endpoint(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<()> {
    state.endpoint_store.set_paused_until(id, None).await?;
    Ok(())
}

/// Clears AI hints (§4.2 `clearAIHints`), the same operation the
/// `clear_hints` planner tool performs, exposed here for manual use.
async fn clear_hints(
    Extension(state): Extension<AppState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<()> {
    state.endpoint_store.clear_ai_hints(id).await?;
    Ok(())
}

pub fn read_routes() -> Router {
    Router::new()
        .route("/endpoints", get(list_endpoints))
        .route("/endpoints/:id", get(get_endpoint))
}

pub fn mutating_routes() -> Router {
    Router::new()
        .route("/endpoints", post(create_endpoint))
        .route("/endpoints/:id", patch(update_endpoint))
        .route("/endpoints/:id/archive", post(archive_endpoint))
        .route("/endpoints/:id/pause", post(pause_endpoint))
        .route("/endpoints/:id/resume", post(resume_endpoint))
        .route("/endpoints/:id/hints", axum::routing::delete(clear_hints))
}
