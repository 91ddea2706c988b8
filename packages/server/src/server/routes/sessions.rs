//! AI session listing routes (§6 "list sessions"). Read-only: sessions
//! are only ever written by the planner worker (C10).

use axum::extract::{Extension, Path, Query};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::common::EndpointId;
use crate::domain::AiSession;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

const DEFAULT_LIMIT: i64 = 20;

#[derive(Deserialize)]
pub struct ListSessionsQuery {
    pub limit: Option<i64>,
}

async fn list_sessions(
    Extension(state): Extension<AppState>,
    Path(endpoint_id): Path<EndpointId>,
    Query(q): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<AiSession>>> {
    let sessions = state
        .session_store
        .list_by_endpoint(endpoint_id, q.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(sessions))
}

pub fn routes() -> Router {
    Router::new().route("/endpoints/:endpoint_id/sessions", get(list_sessions))
}
