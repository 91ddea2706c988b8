//! Store traits (C3 Endpoint Store, C4 Run Store, C5 Session Store, §4.2-
//! §4.4). These are the only place the core talks to persistence; the
//! Governor, metering, quota guard, and planner all depend on `Arc<dyn
//! Base*Store>` rather than a concrete pool so they can be driven by the
//! in-memory fakes in `store::memory` during tests.

pub mod memory;
pub mod postgres;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{AiSessionId, EndpointId, JobId, UserId};
use crate::domain::{
    AiSession, Endpoint, FilteredMetrics, HealthSummary, Job, JobStatus, Run, SiblingResponse, Tier,
};
use types::{AiHintWrite, EndpointPatch, JobPatch, NewAiSession, NewEndpoint, NewJob, NewRun, RunOutcome};

/// Job persistence (§3 "Ownership & lifecycle", §6 management API contract).
/// Not on the scheduler or planner's hot path; exists so the management
/// layer (C14) has somewhere to put "create/list/update/delete jobs".
#[async_trait]
pub trait BaseJobStore: Send + Sync {
    async fn create_job(&self, new: NewJob) -> Result<Job>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    async fn list_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>>;

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<Job>;

    /// Transitions a job's status. Setting `Archived` cascades: every
    /// child endpoint is archived atomically in the same operation (§3
    /// "Deletion of a Job archives all child endpoints atomically").
    async fn set_job_status(&self, id: JobId, status: JobStatus, now: DateTime<Utc>) -> Result<Job>;
}

/// Endpoint persistence and the atomic claim operation the scheduler
/// worker (C8) relies on for at-most-once dispatch (§4.2, §5).
#[async_trait]
pub trait BaseEndpointStore: Send + Sync {
    /// Atomically claims up to `limit` endpoints whose `nextRunAt <= now`,
    /// `lockedUntil` is null or expired, the endpoint isn't archived or
    /// paused, and the owning job is active (§4.2, §4.7 step 1). Sets
    /// `lockedUntil = now + lease_ms` on the claimed rows in the same
    /// statement so no other worker can claim them concurrently.
    async fn claim_due_endpoints(
        &self,
        now: DateTime<Utc>,
        lease_ms: i64,
        limit: i64,
    ) -> Result<Vec<Endpoint>>;

    async fn get_endpoint(&self, id: EndpointId) -> Result<Option<Endpoint>>;

    async fn list_endpoints_by_job(&self, job_id: JobId) -> Result<Vec<Endpoint>>;

    /// Active, unarchived endpoints whose most recent AI session's
    /// `nextAnalysisAt` is unset or `<= now`, or that have never been
    /// analyzed at all (§4.8 "Trigger"). The planner worker (C10) polls
    /// this to decide which endpoints to analyze this tick.
    async fn list_endpoints_due_for_analysis(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Endpoint>>;

    async fn count_active_endpoints_by_user(&self, user_id: UserId) -> Result<i64>;

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<Endpoint>;

    async fn update_endpoint(&self, id: EndpointId, patch: EndpointPatch) -> Result<Endpoint>;

    async fn archive_endpoint(&self, id: EndpointId, now: DateTime<Utc>) -> Result<()>;

    /// Releases the lease and rolls forward scheduling state after a
    /// dispatch completes (§4.7 step 6): sets `nextRunAt`, `lastRunAt`,
    /// the updated `failureCount`, and clears `lockedUntil`.
    async fn update_after_run(
        &self,
        id: EndpointId,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<()>;

    /// Only advances `nextRunAt` if the proposed time is earlier than the
    /// current value (§4.2 `setNextRunAtIfEarlier`, used by the metering
    /// defer-to-end-of-window path's *nudge*, and by tool handlers that
    /// can only bring runs forward, never push them back).
    async fn set_next_run_at_if_earlier(
        &self,
        id: EndpointId,
        candidate: DateTime<Utc>,
    ) -> Result<()>;

    /// Unconditionally sets `nextRunAt`. The one documented exception to
    /// "only earlier": metering's defer-to-next-UTC-month path (§4.6, §9).
    async fn set_next_run_at(&self, id: EndpointId, next_run_at: DateTime<Utc>) -> Result<()>;

    async fn write_ai_hint(&self, id: EndpointId, hint: AiHintWrite) -> Result<()>;

    async fn clear_ai_hints(&self, id: EndpointId) -> Result<()>;

    async fn set_paused_until(&self, id: EndpointId, paused_until: Option<DateTime<Utc>>) -> Result<()>;

    /// Releases a lease taken by `claim_due_endpoints` without advancing
    /// scheduling state, used by the zombie sweep to recover abandoned
    /// leases (§5 "Zombie runs").
    async fn clear_expired_lease(&self, id: EndpointId) -> Result<()>;

    async fn get_user_tier(&self, user_id: UserId) -> Result<Tier>;
}

/// Run persistence and the read-side aggregates the planner (C10/C11) and
/// metering (C9) consume (§4.3, §4.4).
#[async_trait]
pub trait BaseRunStore: Send + Sync {
    async fn create_run(&self, new: NewRun) -> Result<Run>;

    async fn finish_run(
        &self,
        endpoint_id: EndpointId,
        attempt: i32,
        finished_at: DateTime<Utc>,
        outcome: RunOutcome,
    ) -> Result<()>;

    async fn get_latest_response(&self, endpoint_id: EndpointId) -> Result<Option<Run>>;

    /// Most recent `limit` runs (most recent first), `offset`-paginated
    /// (§4.9 `get_response_history`: limit capped at 10 by the tool, not
    /// the store).
    async fn get_response_history(
        &self,
        endpoint_id: EndpointId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>>;

    /// Latest run per sibling endpoint under the same job, excluding
    /// `exclude_endpoint_id` (§4.3, §4.9).
    async fn get_sibling_latest_responses(
        &self,
        job_id: JobId,
        exclude_endpoint_id: EndpointId,
    ) -> Result<Vec<SiblingResponse>>;

    async fn get_health_summary_multi_window(
        &self,
        endpoint_id: EndpointId,
        now: DateTime<Utc>,
    ) -> Result<HealthSummary>;

    /// Aggregate run counts for one user since `since` (§4.3
    /// `getFilteredMetrics`), used by metering (C9) against the monthly
    /// run cap.
    async fn get_filtered_metrics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<FilteredMetrics>;

    /// Finalizes runs still `running` whose endpoint lease has expired by
    /// more than the zombie age threshold, marking them `failed` with
    /// errorMessage `zombie` (§4.3, §5 "Zombie runs").
    async fn cleanup_zombie_runs(
        &self,
        now: DateTime<Utc>,
        zombie_age_ms: i64,
    ) -> Result<u64>;
}

/// AI session persistence and the token-usage read the quota guard (C12)
/// depends on (§4.4, §4.10).
#[async_trait]
pub trait BaseSessionStore: Send + Sync {
    async fn create_session(&self, new: NewAiSession) -> Result<AiSession>;

    async fn list_by_endpoint(&self, endpoint_id: EndpointId, limit: i64) -> Result<Vec<AiSession>>;

    /// Sum of `tokenUsage` across all of a user's endpoints' sessions
    /// since `since` (§4.10 quota check).
    async fn get_token_usage_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<i64>;

    async fn get_ai_session(&self, id: AiSessionId) -> Result<Option<AiSession>>;
}
