//! Plain data-transfer structs for store operations (§4.2-§4.4). Kept
//! separate from `domain` so partial writes (e.g. an AI hint write that
//! only sets some fields) don't need an `Option<Option<T>>` dance on the
//! domain model itself.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::common::{EndpointId, JobId, UserId};
use crate::domain::{HttpMethod, RunSource, RunStatus};

#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
}

/// `Some(None)` clears the column; `None` leaves it untouched (same
/// convention as `EndpointPatch`).
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub job_id: JobId,
    pub tenant_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub baseline_cron: Option<String>,
    pub baseline_interval_ms: Option<i64>,
    pub min_interval_ms: Option<i64>,
    pub max_interval_ms: Option<i64>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<Value>,
    pub body: Option<Value>,
    pub timeout_ms: Option<i64>,
    pub max_execution_time_ms: Option<i64>,
    pub max_response_size_kb: Option<i64>,
    pub next_run_at: DateTime<Utc>,
}

/// A field set to `Some(None)` clears the column; `None` leaves it
/// untouched. Used by `update_endpoint`.
#[derive(Debug, Clone, Default)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Option<Value>>,
    pub body: Option<Option<Value>>,
    pub timeout_ms: Option<Option<i64>>,
    pub max_execution_time_ms: Option<Option<i64>>,
    pub max_response_size_kb: Option<Option<i64>>,
    pub min_interval_ms: Option<Option<i64>>,
    pub max_interval_ms: Option<Option<i64>>,
}

/// One atomic AI-hint write (§4.2 `writeAIHint`): "replaces any existing
/// hint fields atomically". `interval_ms` and `next_run_at` are mutually
/// exclusive in practice (propose_interval vs propose_next_time each write
/// their own shape and leave the other `None`), but the store doesn't
/// enforce that — it's a planner-side convention.
#[derive(Debug, Clone)]
pub struct AiHintWrite {
    pub interval_ms: Option<i64>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub endpoint_id: EndpointId,
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    pub source: RunSource,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub duration_ms: i64,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAiSession {
    pub endpoint_id: EndpointId,
    pub analyzed_at: DateTime<Utc>,
    pub tool_calls: Value,
    pub reasoning: String,
    pub token_usage: Option<i64>,
    pub duration_ms: Option<i64>,
    pub next_analysis_at: Option<DateTime<Utc>>,
    pub endpoint_failure_count: i32,
}
