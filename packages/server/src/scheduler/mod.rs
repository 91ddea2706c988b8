//! Scheduler Worker (C8, §4.7): the tick loop that claims due endpoints,
//! dispatches them, records the outcome, and advances scheduling state via
//! the Governor. Shaped after the teacher's `JobWorker::run` tick loop
//! (`kernel/jobs/worker.rs`): claim a batch, fan the batch out to
//! concurrent `process_one` futures, sleep when the queue is empty, drain
//! in-flight work on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::EndpointId;
use crate::dispatcher::BaseDispatcher;
use crate::domain::{RunSource, Tier};
use crate::governor::{self, FailureCountPolicy, GovernorInput};
use crate::kernel::traits::BaseClock;
use crate::metering::{self, MeteringDecision};
use crate::store::types::NewRun;
use crate::store::{BaseEndpointStore, BaseRunStore};

/// Tunables named in §6's configuration table. Defaults match the
/// authoritative values given there.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Endpoints claimed per tick (§4.7 `BATCH_SIZE`).
    pub batch_size: i64,
    /// How long a claim holds an endpoint before it's considered zombied
    /// (§4.2 "Lease discipline").
    pub lease_ms: i64,
    /// Sleep duration when a claim returns no endpoints (§4.7 `IDLE_MS`).
    pub idle_ms: u64,
    /// Age threshold for the zombie sweep (§4.3 `cleanupZombieRuns`, §5).
    pub zombie_age_ms: i64,
    /// How long shutdown waits for in-flight dispatches to finish before
    /// abandoning them to the zombie sweep (§5 "Cancellation & timeout").
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lease_ms: 60_000,
            idle_ms: 1_000,
            zombie_age_ms: 300_000,
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Claims, dispatches, and reschedules endpoints (§4.7). Holds only
/// `Arc<dyn Base*>` handles, per §5 "no in-process caching of endpoint
/// rows is permitted across tick iterations" — every iteration re-reads
/// through the store.
pub struct SchedulerWorker {
    endpoint_store: Arc<dyn BaseEndpointStore>,
    run_store: Arc<dyn BaseRunStore>,
    dispatcher: Arc<dyn BaseDispatcher>,
    clock: Arc<dyn BaseClock>,
    config: SchedulerConfig,
    running: Arc<RwLock<HashMap<EndpointId, CancellationToken>>>,
}

impl SchedulerWorker {
    pub fn new(
        endpoint_store: Arc<dyn BaseEndpointStore>,
        run_store: Arc<dyn BaseRunStore>,
        dispatcher: Arc<dyn BaseDispatcher>,
        clock: Arc<dyn BaseClock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            endpoint_store,
            run_store,
            dispatcher,
            clock,
            config,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs the tick loop until `shutdown` is cancelled, then drains
    /// in-flight dispatches up to `shutdown_timeout_ms` (§5).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            batch_size = self.config.batch_size,
            lease_ms = self.config.lease_ms,
            "scheduler worker starting"
        );

        let sweep_interval = Duration::from_millis((self.config.zombie_age_ms / 5).max(30_000) as u64);
        let mut last_sweep = tokio::time::Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if last_sweep.elapsed() >= sweep_interval {
                self.sweep_zombies().await;
                last_sweep = tokio::time::Instant::now();
            }

            let now = self.clock.now();
            let claimed = match self
                .endpoint_store
                .claim_due_endpoints(now, self.config.lease_ms, self.config.batch_size)
                .await
            {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    error!(error = %e, "failed to claim due endpoints");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(self.config.idle_ms)) => {}
                }
                continue;
            }

            debug!(count = claimed.len(), "claimed due endpoints");

            let mut handles = Vec::with_capacity(claimed.len());
            for endpoint in claimed {
                let id = endpoint.id;
                let worker = self.clone();
                let cancel = shutdown.child_token();
                worker.running.write().await.insert(id, cancel);
                handles.push(async move {
                    worker.process_one(id).await;
                    worker.running.write().await.remove(&id);
                });
            }

            futures::future::join_all(handles).await;
        }

        let running_count = self.running.read().await.len();
        if running_count > 0 {
            info!(count = running_count, "waiting for in-flight dispatches to drain");
            {
                let running = self.running.read().await;
                for token in running.values() {
                    token.cancel();
                }
            }
            let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
            let start = std::time::Instant::now();
            while !self.running.read().await.is_empty() && start.elapsed() < timeout {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        info!("scheduler worker stopped");
        Ok(())
    }

    async fn sweep_zombies(&self) {
        let now = self.clock.now();
        match self
            .run_store
            .cleanup_zombie_runs(now, self.config.zombie_age_ms)
            .await
        {
            Ok(count) if count > 0 => info!(count, "swept zombie runs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "zombie sweep failed"),
        }
    }

    /// One claimed endpoint's lifecycle: load, meter, dispatch, record,
    /// reschedule (§4.7 `processOne`). Every error path logs and returns
    /// rather than propagating, per §7's propagation policy: one
    /// endpoint's failure must not abort the batch.
    async fn process_one(&self, endpoint_id: EndpointId) {
        let endpoint = match self.endpoint_store.get_endpoint(endpoint_id).await {
            Ok(Some(e)) => e,
            Ok(None) => {
                self.release_lock(endpoint_id).await;
                return;
            }
            Err(e) => {
                error!(endpoint_id = %endpoint_id, error = %e, "failed to load claimed endpoint");
                self.release_lock(endpoint_id).await;
                return;
            }
        };

        // §9 open question: re-check archived state after load in case a
        // concurrent archive raced the claim.
        if endpoint.is_archived() {
            self.release_lock(endpoint_id).await;
            return;
        }

        let tier = match self.endpoint_store.get_user_tier(endpoint.tenant_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "tier lookup failed, assuming free tier floor");
                Tier::Free
            }
        };

        let now = self.clock.now();
        if let MeteringDecision::Defer(next_month) =
            metering::check_monthly_run_cap(self.run_store.as_ref(), endpoint.tenant_id, tier, now).await
        {
            debug!(endpoint_id = %endpoint_id, next_month = %next_month, "deferred by monthly run cap");
            if let Err(e) = self
                .endpoint_store
                .set_next_run_at(endpoint_id, next_month)
                .await
            {
                error!(endpoint_id = %endpoint_id, error = %e, "failed to defer metered endpoint");
            }
            self.release_lock(endpoint_id).await;
            return;
        }

        // §4.7 step 3 phrases this as `failureCount + 1`, but failureCount
        // resets to 0 on every success while `(endpoint_id, attempt)` is the
        // row's identity (Postgres UNIQUE constraint, memory store key) —
        // following the spec's formula literally would hand out attempt 1
        // again after the first success and `finish_run` would update the
        // wrong row. Deriving attempt from the run history keeps it
        // monotonically increasing per endpoint instead.
        let attempt = match self.run_store.get_response_history(endpoint_id, 1, 0).await {
            Ok(history) => history.first().map(|r| r.attempt + 1).unwrap_or(1),
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "failed to read run history for attempt numbering");
                1
            }
        };

        let started_at = self.clock.now();
        let run = match self
            .run_store
            .create_run(NewRun {
                endpoint_id,
                attempt,
                started_at,
                source: RunSource::Schedule,
            })
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(endpoint_id = %endpoint_id, error = %e, "failed to create run row");
                self.release_lock(endpoint_id).await;
                return;
            }
        };

        let outcome = self.dispatcher.dispatch(&endpoint).await;
        let status = outcome.status;
        let finished_at = self.clock.now();

        if let Err(e) = self
            .run_store
            .finish_run(endpoint_id, run.attempt, finished_at, outcome)
            .await
        {
            error!(endpoint_id = %endpoint_id, run_id = %run.id, error = %e, "failed to finish run");
        }

        let governor_now = self.clock.now();
        let next_run_at = match governor::compute_next_run(GovernorInput {
            endpoint: &endpoint,
            now: governor_now,
            last_run_at: started_at,
            tier,
        }) {
            Ok(t) => t,
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "governor pass failed, falling back to a minimal retry delay");
                governor_now + chrono::Duration::seconds(60)
            }
        };

        let failure_count = match FailureCountPolicy::from(status) {
            FailureCountPolicy::Reset => 0,
            FailureCountPolicy::Increment => endpoint.failure_count.saturating_add(1),
        };

        debug!(
            endpoint_id = %endpoint_id,
            run_id = %run.id,
            status = ?status,
            next_run_at = %next_run_at,
            "run recorded"
        );

        if let Err(e) = self
            .endpoint_store
            .update_after_run(endpoint_id, started_at, next_run_at, failure_count)
            .await
        {
            error!(endpoint_id = %endpoint_id, error = %e, "failed to advance endpoint after run");
        }
    }

    async fn release_lock(&self, endpoint_id: EndpointId) {
        if let Err(e) = self.endpoint_store.clear_expired_lease(endpoint_id).await {
            warn!(endpoint_id = %endpoint_id, error = %e, "failed to release endpoint lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{JobId, UserId};
    use crate::domain::{Endpoint, HttpMethod, Job, JobStatus, RunStatus};
    use crate::kernel::traits::FixedClock;
    use crate::store::memory::MemoryStore;
    use crate::store::types::RunOutcome;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    struct AlwaysSucceeds;

    #[async_trait]
    impl BaseDispatcher for AlwaysSucceeds {
        async fn dispatch(&self, _endpoint: &Endpoint) -> RunOutcome {
            RunOutcome {
                status: RunStatus::Success,
                duration_ms: 5,
                status_code: Some(200),
                response_body: Some("{}".into()),
                error_message: None,
            }
        }
    }

    fn seed_endpoint(store: &MemoryStore, next_run_at: chrono::DateTime<Utc>) -> (JobId, EndpointId) {
        let user_id = UserId::new();
        let job_id = JobId::new();
        let now = Utc::now();
        store.insert_job(Job {
            id: job_id,
            user_id,
            name: "job".into(),
            description: None,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
        });
        let endpoint = Endpoint {
            id: EndpointId::new(),
            job_id,
            tenant_id: user_id,
            name: "endpoint".into(),
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
        };
        let endpoint_id = endpoint.id;
        store.insert_endpoint(endpoint);
        (job_id, endpoint_id)
    }

    #[tokio::test]
    async fn process_one_records_a_successful_run_and_advances_schedule() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now() - ChronoDuration::seconds(1);
        let (_, endpoint_id) = seed_endpoint(&store, now);

        let worker = Arc::new(SchedulerWorker::new(
            store.clone(),
            store.clone(),
            Arc::new(AlwaysSucceeds),
            Arc::new(FixedClock(now)),
            SchedulerConfig::default(),
        ));

        let claimed = store
            .claim_due_endpoints(now, 60_000, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        worker.process_one(endpoint_id).await;

        let updated = store.get_endpoint(endpoint_id).await.unwrap().unwrap();
        assert_eq!(updated.failure_count, 0);
        assert!(updated.locked_until.is_none());
        assert!(updated.next_run_at > now);

        let history = store
            .get_response_history(endpoint_id, 1, 0)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Success);
        assert_eq!(history[0].attempt, 1);
    }

    #[tokio::test]
    async fn process_one_releases_lock_for_archived_endpoint() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let (_, endpoint_id) = seed_endpoint(&store, now - ChronoDuration::seconds(1));
        store.archive_endpoint(endpoint_id, now).await.unwrap();

        let worker = Arc::new(SchedulerWorker::new(
            store.clone(),
            store.clone(),
            Arc::new(AlwaysSucceeds),
            Arc::new(FixedClock(now)),
            SchedulerConfig::default(),
        ));

        worker.process_one(endpoint_id).await;

        let history = store
            .get_response_history(endpoint_id, 1, 0)
            .await
            .unwrap();
        assert!(history.is_empty());
    }
}
