//! The Scheduling Governor (C7, §4.5): a pure, synchronous function from
//! `(endpoint, now)` to the next run time. Kept free of I/O so it can be
//! exercised directly in property tests (§8) and invoked identically by
//! the scheduler worker (C8) and by the "nudge earlier" tool handlers
//! (C11) via `setNextRunAtIfEarlier`.

use chrono::{DateTime, Duration, Utc};

use crate::common::CoreResult;
use crate::domain::{Endpoint, Tier};

/// Safety minimum enforced on every Governor result (§4.5 step 7, §8).
const SAFETY_MIN_MS: i64 = 1000;

/// Caps the failure-backoff multiplier at 2^5 = 32x (§4.5 step 4).
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Inputs to one Governor pass. `last_run_at` is deliberately a parameter
/// rather than read off `endpoint.last_run_at`: the scheduler worker calls
/// the Governor with the run's `startedAt`, which hasn't been persisted to
/// the endpoint row yet (§4.7 step 6).
#[derive(Debug, Clone, Copy)]
pub struct GovernorInput<'a> {
    pub endpoint: &'a Endpoint,
    pub now: DateTime<Utc>,
    pub last_run_at: DateTime<Utc>,
    pub tier: Tier,
}

/// Computes the endpoint's next run time following the priority order of
/// §4.5. Returns `ValidationError` only if the endpoint's baseline cron
/// expression is malformed, which creation-time validation should have
/// already ruled out (§4.1).
pub fn compute_next_run(input: GovernorInput<'_>) -> CoreResult<DateTime<Utc>> {
    let GovernorInput {
        endpoint,
        now,
        last_run_at,
        tier,
    } = input;

    // Step 1: pause wins over everything else, unclamped.
    if let Some(paused_until) = endpoint.paused_until {
        if paused_until > now {
            return Ok(paused_until);
        }
    }

    // Step 5 (computed early since every other branch needs it): ref is the
    // later of the last run's start and now, so that an overrunning
    // dispatch reschedules from completion time instead of overlapping.
    let ref_time = last_run_at.max(now);

    let ai_one_shot_active = endpoint
        .ai_hint_next_run_at
        .zip(endpoint.ai_hint_expires_at)
        .map(|(_, expires)| expires > now)
        .unwrap_or(false);

    let ai_interval_active = endpoint
        .ai_hint_interval_ms
        .zip(endpoint.ai_hint_expires_at)
        .map(|(_, expires)| expires > now)
        .unwrap_or(false);

    let candidate_interval_ms: i64 = if ai_one_shot_active {
        // Step 2: AI one-shot competes with the (un-backed-off) baseline.
        let ai_time = endpoint.ai_hint_next_run_at.expect("checked above");
        let baseline_time = endpoint.baseline_next(ref_time)?;
        let candidate_time = ai_time.min(baseline_time);
        (candidate_time - ref_time).num_milliseconds()
    } else if ai_interval_active {
        // Step 3: AI interval bypasses failure backoff entirely.
        endpoint.ai_hint_interval_ms.expect("checked above")
    } else {
        // Step 4: baseline with failure backoff.
        let baseline_ms = baseline_interval_ms(endpoint, ref_time)?;
        let exponent = (endpoint.failure_count.max(0) as u32).min(MAX_BACKOFF_EXPONENT);
        baseline_ms.saturating_mul(1i64 << exponent)
    };

    // Step 6: clamp to the endpoint's bounds and the tier floor.
    let floor = endpoint
        .min_interval_ms
        .unwrap_or(0)
        .max(tier.min_interval_ms());
    let ceiling = endpoint.max_interval_ms.unwrap_or(i64::MAX);
    let clamped_ms = candidate_interval_ms.max(floor).min(ceiling.max(floor));

    let candidate_time = ref_time + Duration::milliseconds(clamped_ms);

    // Step 7: monotonicity safety minimum.
    let safety_floor = now + Duration::milliseconds(SAFETY_MIN_MS);
    Ok(candidate_time.max(safety_floor))
}

/// The baseline's own interval, in milliseconds, ignoring backoff and
/// hints: either the declared fixed interval, or the gap to cron's next
/// occurrence from `ref_time`.
fn baseline_interval_ms(endpoint: &Endpoint, ref_time: DateTime<Utc>) -> CoreResult<i64> {
    use crate::domain::BaselineSchedule;
    match endpoint.baseline() {
        BaselineSchedule::IntervalMs(ms) => Ok(ms),
        BaselineSchedule::Cron(_) => {
            let next = endpoint.baseline_next(ref_time)?;
            Ok((next - ref_time).num_milliseconds().max(0))
        }
    }
}

/// Outcome of a run, used to decide the failure-count policy on completion
/// (§4.5 "Failure-count policy on completion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCountPolicy {
    Reset,
    Increment,
}

impl From<crate::domain::RunStatus> for FailureCountPolicy {
    fn from(status: crate::domain::RunStatus) -> Self {
        if status.is_success() {
            FailureCountPolicy::Reset
        } else {
            FailureCountPolicy::Increment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HttpMethod, RunStatus};
    use crate::common::{EndpointId, JobId, UserId};
    use chrono::TimeZone;

    fn base_endpoint() -> Endpoint {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Endpoint {
            id: EndpointId::new(),
            job_id: JobId::new(),
            tenant_id: UserId::new(),
            name: "test".into(),
            description: None,
            baseline_cron: None,
            baseline_interval_ms: Some(60_000),
            min_interval_ms: None,
            max_interval_ms: None,
            url: "https://example.com".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            timeout_ms: None,
            max_execution_time_ms: None,
            max_response_size_kb: None,
            next_run_at: now,
            last_run_at: None,
            failure_count: 0,
            paused_until: None,
            locked_until: None,
            ai_hint_interval_ms: None,
            ai_hint_next_run_at: None,
            ai_hint_expires_at: None,
            ai_hint_reason: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn baseline_success_path() {
        let endpoint = base_endpoint();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let completion = t0 + Duration::seconds(1);
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: completion,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        // ref = max(t0, completion) = completion; + 60s baseline.
        assert_eq!(next, completion + Duration::seconds(60));
    }

    #[test]
    fn failure_backoff_multiplies_baseline() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(10_000);
        endpoint.failure_count = 3;
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let completion = t0 + Duration::seconds(2);
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: completion,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        assert_eq!(next, completion + Duration::milliseconds(80_000));
    }

    #[test]
    fn backoff_caps_at_32x() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(1_000);
        endpoint.failure_count = 99;
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        assert_eq!(next, t0 + Duration::milliseconds(32_000));
    }

    #[test]
    fn ai_interval_hint_bypasses_backoff() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(10_000);
        endpoint.failure_count = 3;
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        endpoint.ai_hint_interval_ms = Some(30_000);
        endpoint.ai_hint_expires_at = Some(t0 + Duration::hours(1));
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        assert_eq!(next, t0 + Duration::milliseconds(30_000));
    }

    #[test]
    fn expired_ai_hint_falls_back_to_baseline() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(10_000);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        endpoint.ai_hint_interval_ms = Some(30_000);
        endpoint.ai_hint_expires_at = Some(t0 - Duration::minutes(1));
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        assert_eq!(next, t0 + Duration::milliseconds(10_000));
    }

    #[test]
    fn pause_wins_over_everything() {
        let mut endpoint = base_endpoint();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        endpoint.paused_until = Some(t0 + Duration::hours(2));
        endpoint.ai_hint_interval_ms = Some(5_000);
        endpoint.ai_hint_expires_at = Some(t0 + Duration::hours(1));
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Pro,
        })
        .unwrap();
        assert_eq!(next, t0 + Duration::hours(2));
    }

    #[test]
    fn clamp_enforces_tier_floor_even_without_endpoint_bounds() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(5_000);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Free,
        })
        .unwrap();
        // free tier floor is 60s, above the 5s baseline.
        assert_eq!(next, t0 + Duration::milliseconds(60_000));
    }

    #[test]
    fn monotonicity_floor_always_applies() {
        let mut endpoint = base_endpoint();
        endpoint.baseline_interval_ms = Some(1_000);
        endpoint.min_interval_ms = Some(1_000);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: t0,
            last_run_at: t0,
            tier: Tier::Enterprise,
        })
        .unwrap();
        assert!(next >= t0 + Duration::milliseconds(1000));
    }

    #[test]
    fn failure_policy_from_status() {
        assert_eq!(
            FailureCountPolicy::from(RunStatus::Success),
            FailureCountPolicy::Reset
        );
        assert_eq!(
            FailureCountPolicy::from(RunStatus::Failed),
            FailureCountPolicy::Increment
        );
        assert_eq!(
            FailureCountPolicy::from(RunStatus::Timeout),
            FailureCountPolicy::Increment
        );
    }
}
