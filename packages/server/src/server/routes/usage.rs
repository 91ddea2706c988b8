//! Usage reporting (§6 "get usage"). Surfaces the same counters the
//! metering guard (C9) and quota guard (C12) check against, so a caller
//! can see how close a tenant is to its tier caps before either guard
//! kicks in.

use axum::extract::{Extension, Path};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::common::UserId;
use crate::metering::start_of_current_utc_month;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Serialize)]
pub struct UsageResponse {
    pub tier: crate::domain::Tier,
    pub runs_this_month: i64,
    pub monthly_run_cap: i64,
    pub ai_tokens_this_month: i64,
    pub monthly_ai_token_cap: i64,
}

async fn get_usage(
    Extension(state): Extension<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<UsageResponse>> {
    let tier = state.endpoint_store.get_user_tier(user_id).await?;
    let now = chrono::Utc::now();
    let since = start_of_current_utc_month(now);

    let metrics = state.run_store.get_filtered_metrics(user_id, since).await?;
    let ai_tokens = state.session_store.get_token_usage_since(user_id, since).await?;

    Ok(Json(UsageResponse {
        tier,
        runs_this_month: metrics.total_runs,
        monthly_run_cap: tier.monthly_run_cap(),
        ai_tokens_this_month: ai_tokens,
        monthly_ai_token_cap: tier.monthly_ai_token_cap(),
    }))
}

pub fn routes() -> Router {
    Router::new().route("/users/:user_id/usage", get(get_usage))
}
