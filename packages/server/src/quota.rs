//! AI Token Quota Guard (C12, §4.10): gates whether the planner worker
//! (C10) may spend an LLM session's tokens on a given tenant this UTC
//! month.
//!
//! Fails closed: a failed usage lookup means the quota can't be verified,
//! so the guard refuses rather than risk an unbounded spend (§9 — the
//! opposite posture from metering, C9, which fails open).

use chrono::{DateTime, Utc};

use crate::common::UserId;
use crate::domain::Tier;
use crate::metering::start_of_current_utc_month;
use crate::store::BaseSessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny,
}

pub async fn can_proceed(
    session_store: &dyn BaseSessionStore,
    user_id: UserId,
    tier: Tier,
    now: DateTime<Utc>,
) -> QuotaDecision {
    let since = start_of_current_utc_month(now);
    match session_store.get_token_usage_since(user_id, since).await {
        Ok(used) if used >= tier.monthly_ai_token_cap() => QuotaDecision::Deny,
        Ok(_) => QuotaDecision::Allow,
        Err(e) => {
            tracing::warn!(error = %e, "quota usage query failed, failing closed");
            QuotaDecision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    #[tokio::test]
    async fn allows_when_under_cap() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
        let decision = can_proceed(&store, user_id, Tier::Free, now).await;
        assert_eq!(decision, QuotaDecision::Allow);
    }
}
