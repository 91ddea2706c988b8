//! In-memory store implementations used to drive the scheduler and
//! planner workers in tests without a live Postgres instance. Mirrors the
//! Postgres stores' semantics closely enough that the same worker-level
//! tests exercise real claim/lease/backoff behavior.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{AiSessionId, EndpointId, JobId, RunId, UserId};
use crate::domain::{
    AiSession, Endpoint, FilteredMetrics, HealthSummary, Job, JobStatus, Run, RunStatus,
    SiblingResponse, Tier, WindowHealth,
};
use crate::store::types::{
    AiHintWrite, EndpointPatch, JobPatch, NewAiSession, NewEndpoint, NewJob, NewRun, RunOutcome,
};
use crate::store::{BaseEndpointStore, BaseJobStore, BaseRunStore, BaseSessionStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    endpoints: HashMap<EndpointId, Endpoint>,
    runs: HashMap<(EndpointId, i32), Run>,
    sessions: HashMap<AiSessionId, AiSession>,
    tiers: HashMap<UserId, Tier>,
}

/// A single shared in-memory backing store, handed out as three trait
/// objects (one per store trait) so worker code under test depends only
/// on the `Base*Store` traits, exactly as it would against Postgres.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: Job) {
        self.inner.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn insert_endpoint(&self, endpoint: Endpoint) {
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .insert(endpoint.id, endpoint);
    }

    pub fn set_tier(&self, user_id: UserId, tier: Tier) {
        self.inner.lock().unwrap().tiers.insert(user_id, tier);
    }
}

#[async_trait]
impl BaseEndpointStore for MemoryStore {
    async fn claim_due_endpoints(
        &self,
        now: DateTime<Utc>,
        lease_ms: i64,
        limit: i64,
    ) -> Result<Vec<Endpoint>> {
        let mut inner = self.inner.lock().unwrap();
        let jobs = inner.jobs.clone();
        let mut candidate_ids: Vec<EndpointId> = inner
            .endpoints
            .values()
            .filter(|e| {
                e.archived_at.is_none()
                    && e.next_run_at <= now
                    && e.locked_until.map(|l| l <= now).unwrap_or(true)
                    && e.paused_until.map(|p| p <= now).unwrap_or(true)
                    && jobs
                        .get(&e.job_id)
                        .map(|j| j.allows_dispatch())
                        .unwrap_or(true)
            })
            .map(|e| e.id)
            .collect();
        candidate_ids.sort_by_key(|id| inner.endpoints[id].next_run_at);
        candidate_ids.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let endpoint = inner.endpoints.get_mut(&id).expect("just selected");
            endpoint.locked_until = Some(now + chrono::Duration::milliseconds(lease_ms));
            claimed.push(endpoint.clone());
        }
        Ok(claimed)
    }

    async fn get_endpoint(&self, id: EndpointId) -> Result<Option<Endpoint>> {
        Ok(self.inner.lock().unwrap().endpoints.get(&id).cloned())
    }

    async fn list_endpoints_by_job(&self, job_id: JobId) -> Result<Vec<Endpoint>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .endpoints
            .values()
            .filter(|e| e.job_id == job_id && e.archived_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_endpoints_due_for_analysis(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Endpoint>> {
        let inner = self.inner.lock().unwrap();
        let mut latest_analysis: HashMap<EndpointId, DateTime<Utc>> = HashMap::new();
        for session in inner.sessions.values() {
            let next = session.next_analysis_at.unwrap_or(session.analyzed_at);
            latest_analysis
                .entry(session.endpoint_id)
                .and_modify(|existing| {
                    if session.analyzed_at > *existing {
                        *existing = next;
                    }
                })
                .or_insert(next);
        }

        let mut due: Vec<Endpoint> = inner
            .endpoints
            .values()
            .filter(|e| {
                e.archived_at.is_none()
                    && latest_analysis
                        .get(&e.id)
                        .map(|next_analysis_at| *next_analysis_at <= now)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.id);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn count_active_endpoints_by_user(&self, user_id: UserId) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .endpoints
            .values()
            .filter(|e| e.tenant_id == user_id && e.archived_at.is_none())
            .count() as i64)
    }

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<Endpoint> {
        let now = Utc::now();
        let endpoint = Endpoint {
            id: EndpointId::new(),
            job_id: new.job_id,
            tenant_id: new.tenant_id,
            name: new.name,
            description: new.description,
            baseline_cron: new.baseline_cron,
            baseline_interval_ms: new.baseline_interval_ms,
            min_interval_ms: new.min_interval_ms,
            max_interval_ms: new.max_interval_ms,
            url: new.url,
            method: new.method,
            headers: new.headers,
            body: new.body,
            timeout_ms: new.timeout_ms,
            max_execution_time_ms: new.max_execution_time_ms,
            max_response_size_kb: new.max_response_size_kb,
            next_run_at: new.next_run_at,
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
        };
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(&self, id: EndpointId, patch: EndpointPatch) -> Result<Endpoint> {
        let mut inner = self.inner.lock().unwrap();
        let endpoint = inner
            .endpoints
            .get_mut(&id)
            .ok_or_else(|| anyhow!("endpoint not found"))?;
        if let Some(v) = patch.name {
            endpoint.name = v;
        }
        if let Some(v) = patch.description {
            endpoint.description = v;
        }
        if let Some(v) = patch.url {
            endpoint.url = v;
        }
        if let Some(v) = patch.method {
            endpoint.method = v;
        }
        if let Some(v) = patch.headers {
            endpoint.headers = v;
        }
        if let Some(v) = patch.body {
            endpoint.body = v;
        }
        if let Some(v) = patch.timeout_ms {
            endpoint.timeout_ms = v;
        }
        if let Some(v) = patch.max_execution_time_ms {
            endpoint.max_execution_time_ms = v;
        }
        if let Some(v) = patch.max_response_size_kb {
            endpoint.max_response_size_kb = v;
        }
        if let Some(v) = patch.min_interval_ms {
            endpoint.min_interval_ms = v;
        }
        if let Some(v) = patch.max_interval_ms {
            endpoint.max_interval_ms = v;
        }
        endpoint.updated_at = Utc::now();
        Ok(endpoint.clone())
    }

    async fn archive_endpoint(&self, id: EndpointId, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.archived_at = Some(now);
            endpoint.updated_at = now;
        }
        Ok(())
    }

    async fn update_after_run(
        &self,
        id: EndpointId,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.last_run_at = Some(last_run_at);
            endpoint.next_run_at = next_run_at;
            endpoint.failure_count = failure_count;
            endpoint.locked_until = None;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_next_run_at_if_earlier(
        &self,
        id: EndpointId,
        candidate: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            if candidate < endpoint.next_run_at {
                endpoint.next_run_at = candidate;
                endpoint.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn set_next_run_at(&self, id: EndpointId, next_run_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.next_run_at = next_run_at;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn write_ai_hint(&self, id: EndpointId, hint: AiHintWrite) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.ai_hint_interval_ms = hint.interval_ms;
            endpoint.ai_hint_next_run_at = hint.next_run_at;
            endpoint.ai_hint_expires_at = Some(hint.expires_at);
            endpoint.ai_hint_reason = hint.reason;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_ai_hints(&self, id: EndpointId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.ai_hint_interval_ms = None;
            endpoint.ai_hint_next_run_at = None;
            endpoint.ai_hint_expires_at = None;
            endpoint.ai_hint_reason = None;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_paused_until(
        &self,
        id: EndpointId,
        paused_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.paused_until = paused_until;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_expired_lease(&self, id: EndpointId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            endpoint.locked_until = None;
            endpoint.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_user_tier(&self, user_id: UserId) -> Result<Tier> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tiers
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BaseRunStore for MemoryStore {
    async fn create_run(&self, new: NewRun) -> Result<Run> {
        let run = Run {
            id: RunId::new(),
            endpoint_id: new.endpoint_id,
            attempt: new.attempt,
            started_at: new.started_at,
            finished_at: None,
            status: RunStatus::Running,
            duration_ms: None,
            status_code: None,
            response_body: None,
            error_message: None,
            source: new.source,
        };
        self.inner
            .lock()
            .unwrap()
            .runs
            .insert((run.endpoint_id, run.attempt), run.clone());
        Ok(run)
    }

    async fn finish_run(
        &self,
        endpoint_id: EndpointId,
        attempt: i32,
        finished_at: DateTime<Utc>,
        outcome: RunOutcome,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.get_mut(&(endpoint_id, attempt)) {
            run.finished_at = Some(finished_at);
            run.status = outcome.status;
            run.duration_ms = Some(outcome.duration_ms);
            run.status_code = outcome.status_code;
            run.response_body = outcome.response_body;
            run.error_message = outcome.error_message;
        }
        Ok(())
    }

    async fn get_latest_response(&self, endpoint_id: EndpointId) -> Result<Option<Run>> {
        let inner = self.inner.lock().unwrap();
        let mut runs: Vec<&Run> = inner
            .runs
            .values()
            .filter(|r| r.endpoint_id == endpoint_id && r.finished_at.is_some())
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(runs.first().map(|r| (*r).clone()))
    }

    async fn get_response_history(
        &self,
        endpoint_id: EndpointId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>> {
        let inner = self.inner.lock().unwrap();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| r.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(runs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_sibling_latest_responses(
        &self,
        job_id: JobId,
        exclude_endpoint_id: EndpointId,
    ) -> Result<Vec<SiblingResponse>> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for endpoint in inner
            .endpoints
            .values()
            .filter(|e| e.job_id == job_id && e.id != exclude_endpoint_id)
        {
            let mut runs: Vec<&Run> = inner
                .runs
                .values()
                .filter(|r| r.endpoint_id == endpoint.id && r.finished_at.is_some())
                .collect();
            runs.sort_by_key(|r| std::cmp::Reverse(r.started_at));
            if let Some(run) = runs.first() {
                out.push(SiblingResponse {
                    endpoint_id: endpoint.id,
                    endpoint_name: endpoint.name.clone(),
                    status: run.status,
                    response_body: run.response_body.clone(),
                    finished_at: run.finished_at,
                });
            }
        }
        Ok(out)
    }

    async fn get_health_summary_multi_window(
        &self,
        endpoint_id: EndpointId,
        now: DateTime<Utc>,
    ) -> Result<HealthSummary> {
        let inner = self.inner.lock().unwrap();
        let mut finished: Vec<&Run> = inner
            .runs
            .values()
            .filter(|r| r.endpoint_id == endpoint_id && r.finished_at.is_some())
            .collect();
        finished.sort_by_key(|r| std::cmp::Reverse(r.started_at));

        let window = |hours: i64| {
            let since = now - chrono::Duration::hours(hours);
            let (mut s, mut f) = (0i64, 0i64);
            for run in finished.iter().filter(|r| r.started_at >= since) {
                if run.status.is_success() {
                    s += 1;
                } else {
                    f += 1;
                }
            }
            WindowHealth::from_counts(s, f)
        };

        let durations: Vec<i64> = finished
            .iter()
            .filter(|r| r.started_at >= now - chrono::Duration::hours(24))
            .filter_map(|r| r.duration_ms)
            .collect();
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        let failure_streak = finished.iter().take_while(|r| !r.status.is_success()).count() as i64;

        Ok(HealthSummary {
            window_1h: window(1),
            window_4h: window(4),
            window_24h: window(24),
            avg_duration_ms,
            failure_streak,
        })
    }

    async fn get_filtered_metrics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<FilteredMetrics> {
        let inner = self.inner.lock().unwrap();
        let endpoint_ids: std::collections::HashSet<EndpointId> = inner
            .endpoints
            .values()
            .filter(|e| e.tenant_id == user_id)
            .map(|e| e.id)
            .collect();

        let mut metrics = FilteredMetrics::default();
        let mut durations = Vec::new();
        for run in inner.runs.values().filter(|r| {
            endpoint_ids.contains(&r.endpoint_id) && r.started_at >= since && r.finished_at.is_some()
        }) {
            metrics.total_runs += 1;
            if run.status.is_success() {
                metrics.success_count += 1;
            } else {
                metrics.failure_count += 1;
            }
            if let Some(d) = run.duration_ms {
                durations.push(d);
            }
        }
        if !durations.is_empty() {
            metrics.avg_duration_ms =
                Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64);
        }
        Ok(metrics)
    }

    async fn cleanup_zombie_runs(&self, now: DateTime<Utc>, zombie_age_ms: i64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let threshold = now - chrono::Duration::milliseconds(zombie_age_ms);
        let mut count = 0u64;
        for run in inner.runs.values_mut() {
            if run.status == RunStatus::Running && run.started_at < threshold {
                run.status = RunStatus::Failed;
                run.finished_at = Some(now);
                run.duration_ms = Some((now - run.started_at).num_milliseconds());
                run.error_message = Some("zombie".into());
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl BaseSessionStore for MemoryStore {
    async fn create_session(&self, new: NewAiSession) -> Result<AiSession> {
        let session = AiSession {
            id: AiSessionId::new(),
            endpoint_id: new.endpoint_id,
            analyzed_at: new.analyzed_at,
            tool_calls: new.tool_calls,
            reasoning: new.reasoning,
            token_usage: new.token_usage,
            duration_ms: new.duration_ms,
            next_analysis_at: new.next_analysis_at,
            endpoint_failure_count: new.endpoint_failure_count,
        };
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn list_by_endpoint(&self, endpoint_id: EndpointId, limit: i64) -> Result<Vec<AiSession>> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<AiSession> = inner
            .sessions
            .values()
            .filter(|s| s.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.analyzed_at));
        sessions.truncate(limit.max(0) as usize);
        Ok(sessions)
    }

    async fn get_token_usage_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        let endpoint_ids: std::collections::HashSet<EndpointId> = inner
            .endpoints
            .values()
            .filter(|e| e.tenant_id == user_id)
            .map(|e| e.id)
            .collect();
        Ok(inner
            .sessions
            .values()
            .filter(|s| endpoint_ids.contains(&s.endpoint_id) && s.analyzed_at >= since)
            .filter_map(|s| s.token_usage)
            .sum())
    }

    async fn get_ai_session(&self, id: AiSessionId) -> Result<Option<AiSession>> {
        Ok(self.inner.lock().unwrap().sessions.get(&id).cloned())
    }
}

#[async_trait]
impl BaseJobStore for MemoryStore {
    async fn create_job(&self, new: NewJob) -> Result<Job> {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            user_id: new.user_id,
            name: new.name,
            description: new.description,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn list_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<Job> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("job {id} not found"))?;
        if let Some(name) = patch.name {
            job.name = name;
        }
        if let Some(description) = patch.description {
            job.description = description;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn set_job_status(&self, id: JobId, status: JobStatus, now: DateTime<Utc>) -> Result<Job> {
        let mut inner = self.inner.lock().unwrap();
        {
            let job = inner
                .jobs
                .get_mut(&id)
                .ok_or_else(|| anyhow!("job {id} not found"))?;
            job.status = status;
            job.updated_at = now;
        }
        if status == JobStatus::Archived {
            for endpoint in inner.endpoints.values_mut() {
                if endpoint.job_id == id && endpoint.archived_at.is_none() {
                    endpoint.archived_at = Some(now);
                    endpoint.updated_at = now;
                }
            }
        }
        Ok(inner.jobs[&id].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HttpMethod;

    fn endpoint(next_run_at: DateTime<Utc>) -> Endpoint {
        let now = Utc::now();
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
            next_run_at,
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

    #[tokio::test]
    async fn claim_due_endpoints_only_claims_past_due() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let due = endpoint(now - chrono::Duration::seconds(1));
        let not_due = endpoint(now + chrono::Duration::hours(1));
        store.insert_endpoint(due.clone());
        store.insert_endpoint(not_due);

        let claimed = store.claim_due_endpoints(now, 60_000, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due.id);
        assert!(claimed[0].locked_until.is_some());
    }

    #[tokio::test]
    async fn claim_due_endpoints_skips_locked() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut locked = endpoint(now - chrono::Duration::seconds(1));
        locked.locked_until = Some(now + chrono::Duration::minutes(1));
        store.insert_endpoint(locked);

        let claimed = store.claim_due_endpoints(now, 60_000, 10).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn claim_due_endpoints_respects_paused_job() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut job = Job {
            id: JobId::new(),
            user_id: UserId::new(),
            name: "job".into(),
            description: None,
            status: JobStatus::Paused,
            created_at: now,
            updated_at: now,
        };
        let mut ep = endpoint(now - chrono::Duration::seconds(1));
        ep.job_id = job.id;
        job.status = JobStatus::Paused;
        store.insert_job(job);
        store.insert_endpoint(ep);

        let claimed = store.claim_due_endpoints(now, 60_000, 10).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn set_next_run_at_if_earlier_only_moves_forward_in_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ep = endpoint(now + chrono::Duration::hours(1));
        let id = ep.id;
        store.insert_endpoint(ep);

        store
            .set_next_run_at_if_earlier(id, now + chrono::Duration::hours(2))
            .await
            .unwrap();
        let unchanged = store.get_endpoint(id).await.unwrap().unwrap();
        assert_eq!(unchanged.next_run_at, now + chrono::Duration::hours(1));

        store
            .set_next_run_at_if_earlier(id, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        let moved = store.get_endpoint(id).await.unwrap().unwrap();
        assert_eq!(moved.next_run_at, now + chrono::Duration::minutes(10));
    }
}
