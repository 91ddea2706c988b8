//! Run (§3): one execution attempt of an endpoint. Rows are created in
//! `running` state and finalized exactly once by the worker that created
//! them; never updated-in-place afterward except by the zombie sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{EndpointId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Success,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "run_source", rename_all = "snake_case")]
pub enum RunSource {
    #[default]
    Schedule,
    Test,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: RunId,
    pub endpoint_id: EndpointId,
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub duration_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub source: RunSource,
}

/// Rolling health counts over one lookback window (§4.3
/// `getHealthSummaryMultiWindow`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowHealth {
    pub success_count: i64,
    pub failure_count: i64,
    pub success_rate: f64,
}

impl WindowHealth {
    pub fn from_counts(success_count: i64, failure_count: i64) -> Self {
        let total = success_count + failure_count;
        let success_rate = if total == 0 {
            1.0
        } else {
            success_count as f64 / total as f64
        };
        Self {
            success_count,
            failure_count,
            success_rate,
        }
    }
}

/// Combined 1h/4h/24h health windows plus derived values the planner (C10)
/// uses to build its prompt (§4.8 step 3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    pub window_1h: WindowHealth,
    pub window_4h: WindowHealth,
    pub window_24h: WindowHealth,
    pub avg_duration_ms: Option<f64>,
    pub failure_streak: i64,
}

/// One other endpoint's most recent response, surfaced by
/// `get_sibling_latest_responses` (§4.9) and `getSiblingLatestResponses`
/// (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingResponse {
    pub endpoint_id: EndpointId,
    pub endpoint_name: String,
    pub status: RunStatus,
    pub response_body: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Usage metrics for one user over one window (§4.3
/// `getFilteredMetrics`, used by metering C9).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilteredMetrics {
    pub total_runs: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_duration_ms: Option<f64>,
}

/// Truncates a response body to 1000 characters for LLM/token-economy
/// surfaces (§4.9, §9 "Response-body size policy"). The raw/size-capped
/// body stored in the Run row is untouched; this is only applied at the
/// point of surfacing to the planner.
pub fn truncate_for_llm(body: &str) -> String {
    const LIMIT: usize = 1000;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(LIMIT).collect();
        format!("{truncated}... [truncated]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_bodies_untouched() {
        assert_eq!(truncate_for_llm("hello"), "hello");
    }

    #[test]
    fn truncate_caps_long_bodies_at_1000_chars() {
        let body = "a".repeat(5000);
        let truncated = truncate_for_llm(&body);
        assert!(truncated.starts_with(&"a".repeat(1000)));
        assert!(truncated.ends_with("[truncated]"));
    }

    #[test]
    fn window_health_full_success_rate_when_empty() {
        let h = WindowHealth::from_counts(0, 0);
        assert_eq!(h.success_rate, 1.0);
    }

    #[test]
    fn window_health_rate_is_success_over_total() {
        let h = WindowHealth::from_counts(3, 1);
        assert_eq!(h.success_rate, 0.75);
    }
}
