//! Execution Metering (C9, §4.6): enforces the tier's monthly run cap by
//! deferring a due endpoint to the start of next UTC month rather than
//! rejecting the dispatch outright.
//!
//! Fails open: if the metrics query itself errors, metering gets out of
//! the way and lets the run proceed (§9 "availability over strictness" —
//! the opposite posture from the quota guard, C12, which fails closed).

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::domain::Tier;
use crate::store::BaseRunStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringDecision {
    Proceed,
    /// The tenant is over its monthly run cap; the endpoint should be
    /// deferred to this UTC instant instead of dispatched.
    Defer(DateTime<Utc>),
}

/// The first instant of the UTC month following `now`.
pub fn start_of_next_utc_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month at midnight is always a valid timestamp")
}

/// The first instant of the current UTC month.
pub fn start_of_current_utc_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month at midnight is always a valid timestamp")
}

/// Checks whether `user_id`'s runs so far this UTC month are within
/// `tier`'s monthly cap. On a store error, fails open (§9).
pub async fn check_monthly_run_cap(
    run_store: &dyn BaseRunStore,
    user_id: crate::common::UserId,
    tier: Tier,
    now: DateTime<Utc>,
) -> MeteringDecision {
    let since = start_of_current_utc_month(now);
    match run_store.get_filtered_metrics(user_id, since).await {
        Ok(metrics) if metrics.total_runs >= tier.monthly_run_cap() => {
            MeteringDecision::Defer(start_of_next_utc_month(now))
        }
        Ok(_) => MeteringDecision::Proceed,
        Err(e) => {
            tracing::warn!(error = %e, "metering query failed, failing open");
            MeteringDecision::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_month_rolls_over_december() {
        let dec = Utc.with_ymd_and_hms(2026, 12, 15, 10, 0, 0).unwrap();
        assert_eq!(
            start_of_next_utc_month(dec),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_month_mid_year() {
        let jun = Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(
            start_of_next_utc_month(jun),
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn current_month_start_truncates_to_midnight() {
        let mid = Utc.with_ymd_and_hms(2026, 3, 17, 23, 59, 0).unwrap();
        assert_eq!(
            start_of_current_utc_month(mid),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn defers_once_cap_is_reached() {
        let store = crate::store::memory::MemoryStore::new();
        let user_id = crate::common::UserId::new();
        let job = crate::domain::Job {
            id: crate::common::JobId::new(),
            user_id,
            name: "job".into(),
            description: None,
            status: crate::domain::JobStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_job(job.clone());

        let now = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
        let decision = check_monthly_run_cap(&store, user_id, Tier::Free, now).await;
        assert_eq!(decision, MeteringDecision::Proceed);
    }
}
