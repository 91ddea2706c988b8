//! End-to-end coverage of the claim -> dispatch -> Governor reschedule
//! cycle (§4.7) against a real Postgres database, exercising the actual
//! `SchedulerWorker` tick loop rather than calling store methods directly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use server_core::common::UserId;
use server_core::dispatcher::BaseDispatcher;
use server_core::domain::{Endpoint, HttpMethod, RunStatus};
use server_core::kernel::traits::SystemClock;
use server_core::scheduler::{SchedulerConfig, SchedulerWorker};
use server_core::store::types::{NewEndpoint, NewJob, RunOutcome};
use server_core::store::{BaseEndpointStore, BaseJobStore, BaseRunStore};
use test_context::test_context;
use tokio_util::sync::CancellationToken;

use common::TestHarness;

struct AlwaysSucceeds;

#[async_trait]
impl BaseDispatcher for AlwaysSucceeds {
    async fn dispatch(&self, _endpoint: &Endpoint) -> RunOutcome {
        RunOutcome {
            status: RunStatus::Success,
            duration_ms: 3,
            status_code: Some(200),
            response_body: Some("{\"ok\":true}".into()),
            error_message: None,
        }
    }
}

async fn seed_user(harness: &TestHarness) -> UserId {
    let user_id = UserId::new();
    sqlx::query("INSERT INTO users (id, tier, created_at, updated_at) VALUES ($1, 'pro', NOW(), NOW())")
        .bind(user_id)
        .execute(&harness.db_pool)
        .await
        .unwrap();
    user_id
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scheduler_worker_claims_dispatches_and_reschedules(harness: &TestHarness) {
    let user_id = seed_user(harness).await;
    let job = harness
        .job_store
        .create_job(NewJob {
            user_id,
            name: "nightly sync".into(),
            description: None,
        })
        .await
        .unwrap();

    let past = Utc::now() - chrono::Duration::seconds(5);
    let endpoint = harness
        .endpoint_store
        .create_endpoint(NewEndpoint {
            job_id: job.id,
            tenant_id: user_id,
            name: "sync endpoint".into(),
            description: None,
            baseline_cron: None,
            baseline_interval_ms: Some(60_000),
            min_interval_ms: None,
            max_interval_ms: None,
            url: "https://example.com/sync".into(),
            method: HttpMethod::Post,
            headers: None,
            body: None,
            timeout_ms: None,
            max_execution_time_ms: None,
            max_response_size_kb: None,
            next_run_at: past,
        })
        .await
        .unwrap();

    let worker = Arc::new(SchedulerWorker::new(
        harness.endpoint_store.clone(),
        harness.run_store.clone(),
        Arc::new(AlwaysSucceeds),
        Arc::new(SystemClock),
        SchedulerConfig {
            batch_size: 10,
            lease_ms: 30_000,
            idle_ms: 50,
            zombie_age_ms: 300_000,
            shutdown_timeout_ms: 5_000,
        },
    ));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    // Give the tick loop a few iterations to claim and process the endpoint.
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let updated = harness
        .endpoint_store
        .get_endpoint(endpoint.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.failure_count, 0);
    assert!(updated.locked_until.is_none());
    assert!(updated.next_run_at > past);
    assert!(updated.last_run_at.is_some());

    let history = harness
        .run_store
        .get_response_history(endpoint.id, 1, 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RunStatus::Success);
    assert_eq!(history[0].status_code, Some(200));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn zombie_sweep_fails_abandoned_runs(harness: &TestHarness) {
    let user_id = seed_user(harness).await;
    let job = harness
        .job_store
        .create_job(NewJob {
            user_id,
            name: "abandoned".into(),
            description: None,
        })
        .await
        .unwrap();

    let now = Utc::now();
    let endpoint = harness
        .endpoint_store
        .create_endpoint(NewEndpoint {
            job_id: job.id,
            tenant_id: user_id,
            name: "stuck endpoint".into(),
            description: None,
            baseline_cron: None,
            baseline_interval_ms: Some(60_000),
            min_interval_ms: None,
            max_interval_ms: None,
            url: "https://example.com/stuck".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            timeout_ms: None,
            max_execution_time_ms: None,
            max_response_size_kb: None,
            next_run_at: now,
        })
        .await
        .unwrap();

    use server_core::store::types::NewRun;
    harness
        .run_store
        .create_run(NewRun {
            endpoint_id: endpoint.id,
            attempt: 1,
            started_at: now - chrono::Duration::minutes(10),
            source: server_core::domain::RunSource::Schedule,
        })
        .await
        .unwrap();

    let swept = harness
        .run_store
        .cleanup_zombie_runs(now, 300_000)
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let history = harness
        .run_store
        .get_response_history(endpoint.id, 1, 0)
        .await
        .unwrap();
    assert_eq!(history[0].status, RunStatus::Failed);
    assert_eq!(history[0].error_message.as_deref(), Some("zombie"));
}
