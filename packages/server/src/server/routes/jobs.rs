//! Job management routes (§6 "create/list/update/delete jobs"). Thin
//! wrappers over `BaseJobStore`; the core never authorizes (§7) so there's
//! no tenant check here beyond the `userId` query/body parameter the
//! caller supplies.

use axum::extract::{Extension, Path, Query};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::common::{CoreError, JobId, UserId};
use crate::domain::{Job, JobStatus};
use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::store::types::{JobPatch, NewJob};

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateJobRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct SetJobStatusRequest {
    pub status: JobStatus,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub user_id: UserId,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

async fn create_job(
    Extension(state): Extension<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<Json<Job>> {
    if req.name.trim().is_empty() {
        return Err(ApiError(CoreError::validation("name must not be empty")));
    }
    let job = state
        .job_store
        .create_job(NewJob {
            user_id: req.user_id,
            name: req.name,
            description: req.description,
        })
        .await?;
    Ok(Json(job))
}

async fn list_jobs(
    Extension(state): Extension<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = state.job_store.list_jobs_by_user(q.user_id).await?;
    Ok(Json(jobs))
}

async fn get_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<Job>> {
    let job = state
        .job_store
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("job")))?;
    Ok(Json(job))
}

async fn update_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<UpdateJobRequest>,
) -> ApiResult<Json<Job>> {
    let job = state
        .job_store
        .update_job(
            id,
            JobPatch {
                name: req.name,
                description: req.description,
            },
        )
        .await?;
    Ok(Json(job))
}

/// Archiving a job cascades to all of its child endpoints (§3
/// "Ownership & lifecycle"). `paused`/`active` transitions only affect
/// whether the scheduler claims the job's endpoints (§4.2).
async fn set_job_status(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<SetJobStatusRequest>,
) -> ApiResult<Json<Job>> {
    let job = state
        .job_store
        .set_job_status(id, req.status, Utc::now())
        .await?;
    Ok(Json(job))
}

pub fn read_routes() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
}

pub fn mutating_routes() -> Router {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id", patch(update_job))
        .route("/jobs/:id/status", post(set_job_status))
}
