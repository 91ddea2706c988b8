//! Endpoint (§3): a scheduled HTTP invocation target. This is the unit the
//! Governor (C7) reschedules and the scheduler worker (C8) claims and
//! dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{CoreError, CoreResult, EndpointId, JobId, UserId};
use crate::cron;
use crate::domain::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "http_method", rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One of the two mutually-exclusive baseline schedule kinds (§3 invariant:
/// "exactly one of (cron, baselineIntervalMs) is non-null at creation").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineSchedule {
    Cron(String),
    IntervalMs(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Endpoint {
    pub id: EndpointId,
    pub job_id: JobId,
    pub tenant_id: UserId,
    pub name: String,
    pub description: Option<String>,

    // Baseline schedule: exactly one of these two is set (§3 invariant).
    pub baseline_cron: Option<String>,
    pub baseline_interval_ms: Option<i64>,

    // Clamp bounds (§3, §4.5 step 6).
    pub min_interval_ms: Option<i64>,
    pub max_interval_ms: Option<i64>,

    // Request shape (§4.4).
    pub url: String,
    pub method: HttpMethod,
    pub headers: Option<serde_json::Value>,
    pub body: Option<serde_json::Value>,
    pub timeout_ms: Option<i64>,
    pub max_execution_time_ms: Option<i64>,
    pub max_response_size_kb: Option<i64>,

    // Execution state (§3).
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub failure_count: i32,
    pub paused_until: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,

    // AI hint fields, all co-expiring via `ai_hint_expires_at` (§3).
    pub ai_hint_interval_ms: Option<i64>,
    pub ai_hint_next_run_at: Option<DateTime<Utc>>,
    pub ai_hint_expires_at: Option<DateTime<Utc>>,
    pub ai_hint_reason: Option<String>,

    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_paused_at(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.map(|u| u > now).unwrap_or(false)
    }

    pub fn has_active_ai_hint(&self, now: DateTime<Utc>) -> bool {
        self.ai_hint_expires_at.map(|exp| exp > now).unwrap_or(false)
    }

    pub fn baseline(&self) -> BaselineSchedule {
        match (&self.baseline_cron, self.baseline_interval_ms) {
            (Some(expr), _) => BaselineSchedule::Cron(expr.clone()),
            (None, Some(ms)) => BaselineSchedule::IntervalMs(ms),
            (None, None) => {
                // Guarded against at construction time (§3 invariant); a
                // record reaching this state is a store bug, not a normal
                // runtime condition.
                BaselineSchedule::IntervalMs(60_000)
            }
        }
    }

    /// The next time the baseline schedule alone would fire, measured from
    /// `ref_time` (§4.5 step 4/5).
    pub fn baseline_next(&self, ref_time: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        match self.baseline() {
            BaselineSchedule::Cron(expr) => cron::next(&expr, ref_time)
                .map_err(|e| CoreError::validation(format!("bad cron expression: {e}"))),
            BaselineSchedule::IntervalMs(ms) => Ok(ref_time + chrono::Duration::milliseconds(ms)),
        }
    }

    /// Validates the creation-time invariants of §3. Called at the API
    /// boundary, never by the worker (ValidationError never reaches it).
    pub fn validate_new(
        baseline_cron: &Option<String>,
        baseline_interval_ms: &Option<i64>,
        min_interval_ms: &Option<i64>,
        max_interval_ms: &Option<i64>,
        tier: Tier,
    ) -> CoreResult<()> {
        match (baseline_cron, baseline_interval_ms) {
            (Some(_), Some(_)) => {
                return Err(CoreError::validation(
                    "exactly one of cron or baselineIntervalMs must be set, not both",
                ))
            }
            (None, None) => {
                return Err(CoreError::validation(
                    "exactly one of cron or baselineIntervalMs must be set",
                ))
            }
            (Some(expr), None) => {
                cron::validate(expr)
                    .map_err(|e| CoreError::validation(format!("bad cron expression: {e}")))?;
            }
            (None, Some(ms)) => {
                if *ms < tier.min_interval_ms() {
                    return Err(CoreError::validation(format!(
                        "baselineIntervalMs {ms} is below the {:?} tier floor of {}ms",
                        tier,
                        tier.min_interval_ms()
                    )));
                }
            }
        }

        if let Some(min_ms) = min_interval_ms {
            if *min_ms < 1000 {
                return Err(CoreError::validation("minIntervalMs must be >= 1000"));
            }
            if *min_ms < tier.min_interval_ms() {
                return Err(CoreError::validation(format!(
                    "minIntervalMs {min_ms} is below the {:?} tier floor",
                    tier
                )));
            }
        }

        if let (Some(min_ms), Some(max_ms)) = (min_interval_ms, max_interval_ms) {
            if max_ms < min_ms {
                return Err(CoreError::validation(
                    "maxIntervalMs must be >= minIntervalMs when both are set",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_both_cron_and_interval() {
        let err = Endpoint::validate_new(
            &Some("* * * * *".into()),
            &Some(60_000),
            &None,
            &None,
            Tier::Pro,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_neither_cron_nor_interval() {
        let err = Endpoint::validate_new(&None, &None, &None, &None, Tier::Pro).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_interval_below_tier_floor() {
        let err =
            Endpoint::validate_new(&None, &Some(5_000), &None, &None, Tier::Free).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn accepts_valid_cron_endpoint() {
        Endpoint::validate_new(
            &Some("*/5 * * * *".into()),
            &None,
            &Some(60_000),
            &Some(3_600_000),
            Tier::Pro,
        )
        .unwrap();
    }

    #[test]
    fn rejects_max_below_min() {
        let err = Endpoint::validate_new(
            &None,
            &Some(60_000),
            &Some(60_000),
            &Some(30_000),
            Tier::Pro,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
