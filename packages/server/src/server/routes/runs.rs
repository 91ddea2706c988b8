//! Run listing routes (§6 "list runs"). Read-only: runs are only ever
//! written by the scheduler worker (C8).

use axum::extract::{Extension, Path, Query};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::domain::Run;
use crate::common::EndpointId;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

const DEFAULT_LIMIT: i64 = 20;

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn list_runs(
    Extension(state): Extension<AppState>,
    Path(endpoint_id): Path<EndpointId>,
    Query(q): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<Run>>> {
    let runs = state
        .run_store
        .get_response_history(
            endpoint_id,
            q.limit.unwrap_or(DEFAULT_LIMIT),
            q.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(runs))
}

pub fn routes() -> Router {
    Router::new().route("/endpoints/:endpoint_id/runs", get(list_runs))
}
